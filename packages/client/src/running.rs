//! "Tracking active" flag.
//!
//! `RunningFlag` is owned by the lifecycle controller. Each running session
//! holds a `RunningGuard`; the flag reads `true` while any guard is alive and
//! drops back to `false` when the last guard is released, including when a
//! session task is aborted or panics. Observers get a read-only
//! `RunningStatus`.

use std::sync::Arc;

use tokio::sync::watch;

/// Owner side of the running flag.
#[derive(Debug)]
pub struct RunningFlag {
    active: Arc<watch::Sender<usize>>,
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningFlag {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    /// Mark a session as running until the returned guard is dropped.
    pub fn acquire(&self) -> RunningGuard {
        self.active.send_modify(|count| *count += 1);
        RunningGuard {
            active: Arc::clone(&self.active),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.active.borrow() > 0
    }

    /// Read-only view for collaborators such as the UI.
    pub fn status(&self) -> RunningStatus {
        RunningStatus {
            active: self.active.subscribe(),
        }
    }
}

/// Keeps the flag raised while alive.
#[derive(Debug)]
pub struct RunningGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.active
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Read-only, observable view of the running flag.
#[derive(Debug, Clone)]
pub struct RunningStatus {
    active: watch::Receiver<usize>,
}

impl RunningStatus {
    pub fn is_running(&self) -> bool {
        *self.active.borrow() > 0
    }

    /// Wait until the flag equals `running`.
    pub async fn wait_for(&mut self, running: bool) {
        // The sender lives as long as the flag; a closed channel means the flag is gone.
        let _ = self.active.wait_for(|count| (*count > 0) == running).await;
    }
}
