//! Source for positions pushed in by an external provider.
//!
//! Each `subscribe()` creates a fresh feed and hands it to the provider over
//! the subscription channel; the provider publishes on it until the session
//! unsubscribes.

use tokio::sync::mpsc;

use super::{DEFAULT_FEED_CAPACITY, PositionFeed, PositionSource, PositionStream};

#[derive(Debug, Clone)]
pub struct BridgePositionSource {
    subscriptions: mpsc::UnboundedSender<PositionFeed>,
    capacity: usize,
}

impl BridgePositionSource {
    /// Create the source and the receiver the provider listens on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PositionFeed>) {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::UnboundedReceiver<PositionFeed>) {
        let (subscriptions, receiver) = mpsc::unbounded_channel();
        (
            Self {
                subscriptions,
                capacity,
            },
            receiver,
        )
    }
}

impl PositionSource for BridgePositionSource {
    fn subscribe(&self) -> PositionStream {
        let (feed, stream) = PositionStream::channel(self.capacity);
        if self.subscriptions.send(feed).is_err() {
            // Provider is gone; the stream ends immediately.
            tracing::warn!("Position provider is not listening for subscriptions");
        }
        stream
    }
}
