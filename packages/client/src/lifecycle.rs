//! Start/stop control boundary.
//!
//! Maps control signals onto at most one `TrackingSession` per process.
//! Every operation takes the same lock, so a teardown that races an
//! in-flight start waits for it and then stops the session it created.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    running::{RunningFlag, RunningStatus},
    session::TrackingSession,
};

/// Control signals from the supervising layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Start,
    Stop,
}

/// Builds a fresh session for each start.
pub trait SessionFactory: Send + Sync {
    fn create(&self) -> TrackingSession;
}

impl<F> SessionFactory for F
where
    F: Fn() -> TrackingSession + Send + Sync,
{
    fn create(&self) -> TrackingSession {
        self()
    }
}

pub struct LifecycleController {
    factory: Arc<dyn SessionFactory>,
    running: RunningFlag,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    session: Option<TrackingSession>,
    torn_down: bool,
}

impl LifecycleController {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            running: RunningFlag::new(),
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Whether a session is currently tracking.
    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Read-only view of the running flag.
    pub fn status(&self) -> RunningStatus {
        self.running.status()
    }

    pub async fn handle(&self, signal: ControlSignal) {
        match signal {
            ControlSignal::Start => {
                self.start().await;
            }
            ControlSignal::Stop => self.stop().await,
        }
    }

    /// Start a session unless one is running. Returns whether one was started.
    pub async fn start(&self) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.torn_down {
            tracing::warn!("Start ignored: process is shutting down");
            return false;
        }
        if self.running.is_running() {
            tracing::debug!("Start ignored: tracking is already running");
            return false;
        }

        // A session that ended on its own is still parked here.
        if let Some(mut finished) = slot.session.take() {
            finished.stop().await;
        }

        let mut session = self.factory.create();
        session.start(self.running.acquire()).await;
        slot.session = Some(session);
        true
    }

    /// Stop the current session, if any.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        match slot.session.take() {
            Some(mut session) => session.stop().await,
            None => tracing::debug!("Stop ignored: no tracking session"),
        }
    }

    /// Process teardown hook. Stops the session exactly once and refuses any
    /// later start.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if slot.torn_down {
            return;
        }
        slot.torn_down = true;
        if let Some(mut session) = slot.session.take() {
            session.stop().await;
        }
        tracing::info!("Lifecycle controller shut down");
    }
}
