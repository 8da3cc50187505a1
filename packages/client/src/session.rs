//! Tracking session: position source -> wire codec -> connection.
//!
//! One worker task consumes the subscription, so samples are encoded, sent
//! and reported strictly in arrival order. A sample that cannot be encoded
//! or sent is logged and dropped; the session keeps going. Only the end of
//! the position feed terminates the session from the inside.

use std::sync::Arc;

use livetrack_shared::wire::{self, DeviceId, PositionSample};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    connection::{ConnectionManager, ConnectionState, SendResult},
    error::SourceError,
    running::RunningGuard,
    source::{PositionSource, PositionStream},
    status::StatusSink,
};

/// Why the worker finished.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionExit {
    /// `stop()` was called
    Stopped,
    /// The position source ended or failed
    UpstreamTerminated(SourceError),
}

pub struct TrackingSession {
    source: Arc<dyn PositionSource>,
    connection: ConnectionManager,
    sink: Arc<dyn StatusSink>,
    device_id: DeviceId,
    worker: Option<Worker>,
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<SessionExit>,
}

impl TrackingSession {
    pub fn new(
        source: Arc<dyn PositionSource>,
        connection: ConnectionManager,
        sink: Arc<dyn StatusSink>,
        device_id: DeviceId,
    ) -> Self {
        Self {
            source,
            connection,
            sink,
            device_id,
            worker: None,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Whether the worker is still consuming samples.
    pub fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Subscribe to the source and start connecting.
    ///
    /// `running` is held by the worker and released when it finishes, however
    /// it finishes. Calling `start` on an active session is a no-op.
    pub async fn start(&mut self, running: RunningGuard) {
        if self.is_active() {
            tracing::debug!("Tracking session already active");
            return;
        }

        let stream = self.source.subscribe();
        let state_rx = self.connection.subscribe_state();
        self.connection.connect().await;

        let shutdown = CancellationToken::new();
        let pipeline = Pipeline {
            connection: self.connection.clone(),
            sink: Arc::clone(&self.sink),
            device_id: self.device_id.clone(),
            stream,
            state_rx,
            shutdown: shutdown.clone(),
            _running: running,
        };
        let handle = tokio::spawn(pipeline.run());

        self.worker = Some(Worker { shutdown, handle });
        tracing::info!("Tracking session started for device '{}'", self.device_id);
    }

    /// Unsubscribe, close the connection and wait for the worker.
    ///
    /// Idempotent; a session that was never started is left untouched.
    pub async fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            tracing::debug!("Tracking session not started; nothing to stop");
            return;
        };

        worker.shutdown.cancel();
        match worker.handle.await {
            Ok(exit) => tracing::debug!("Session worker finished: {:?}", exit),
            Err(e) if e.is_panic() => tracing::error!("Session worker panicked: {}", e),
            Err(_) => {}
        }

        self.connection.stop().await;
        self.sink
            .on_connection_state_changed(self.connection.state());
        tracing::info!("Tracking session stopped");
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.shutdown.cancel();

        // Last resort when the owner never called stop(): close from a task.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let connection = self.connection.clone();
            runtime.spawn(async move { connection.stop().await });
        }
    }
}

struct Pipeline {
    connection: ConnectionManager,
    sink: Arc<dyn StatusSink>,
    device_id: DeviceId,
    stream: PositionStream,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    _running: RunningGuard,
}

impl Pipeline {
    async fn run(mut self) -> SessionExit {
        let initial = *self.state_rx.borrow_and_update();
        self.sink.on_connection_state_changed(initial);

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break SessionExit::Stopped,
                Ok(()) = self.state_rx.changed() => {
                    let state = *self.state_rx.borrow_and_update();
                    self.sink.on_connection_state_changed(state);
                }
                item = self.stream.next() => match item {
                    Some(Ok(sample)) => self.handle_sample(sample).await,
                    Some(Err(error)) => break SessionExit::UpstreamTerminated(error),
                    None => break SessionExit::UpstreamTerminated(SourceError::Ended),
                },
            }
        };

        self.stream.unsubscribe();
        if let SessionExit::UpstreamTerminated(error) = &exit {
            tracing::error!("Tracking stopped: {}", error);
            self.connection.stop().await;
            self.sink
                .on_connection_state_changed(self.connection.state());
        }
        exit
    }

    async fn handle_sample(&self, sample: PositionSample) {
        match wire::encode(&sample, &self.device_id) {
            Ok(payload) => match self.connection.send(payload).await {
                SendResult::Delivered => tracing::debug!(
                    "Sent location ({}, {})",
                    sample.latitude,
                    sample.longitude
                ),
                SendResult::Failed(reason) => tracing::warn!("Dropped location: {}", reason),
            },
            Err(error) => tracing::warn!("Dropped malformed location: {}", error),
        }

        // Display does not depend on delivery.
        self.sink.on_sample(sample.latitude, sample.longitude);
    }
}
