//! Position source seam.
//!
//! A source hands out a `PositionStream` per subscription. The stream is the
//! consumer end of a bounded channel plus a cancellation token: dropping it or
//! calling `unsubscribe()` tells the producer (holding the matching
//! `PositionFeed`) to stop delivering.

use livetrack_shared::wire::PositionSample;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;

mod bridge;
mod simulated;

pub use bridge::BridgePositionSource;
pub use simulated::SimulatedPositionSource;

/// Default channel capacity between a provider and the session.
pub const DEFAULT_FEED_CAPACITY: usize = 16;

type Item = Result<PositionSample, SourceError>;

/// Something that produces position samples once subscribed.
pub trait PositionSource: Send + Sync {
    /// Start delivering samples. Must be called inside a tokio runtime.
    fn subscribe(&self) -> PositionStream;
}

/// Consumer end of a subscription.
#[derive(Debug)]
pub struct PositionStream {
    receiver: mpsc::Receiver<Item>,
    cancel: CancellationToken,
}

impl PositionStream {
    /// Create a connected feed/stream pair.
    pub fn channel(capacity: usize) -> (PositionFeed, PositionStream) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        (
            PositionFeed {
                sender,
                cancel: cancel.clone(),
            },
            PositionStream { receiver, cancel },
        )
    }

    /// Next sample, a provider error, or `None` once every feed is gone.
    pub async fn next(&mut self) -> Option<Item> {
        self.receiver.recv().await
    }

    /// Stop delivery. Samples already queued are discarded.
    pub fn unsubscribe(&mut self) {
        self.cancel.cancel();
        self.receiver.close();
    }
}

impl Drop for PositionStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Producer end of a subscription.
#[derive(Debug, Clone)]
pub struct PositionFeed {
    sender: mpsc::Sender<Item>,
    cancel: CancellationToken,
}

impl PositionFeed {
    /// Deliver a sample, waiting for room in the channel.
    ///
    /// Returns `false` once the subscriber has gone away.
    pub async fn publish(&self, sample: PositionSample) -> bool {
        self.deliver(Ok(sample)).await
    }

    /// Report a provider failure. The subscriber treats it as terminal.
    pub async fn fail(&self, error: SourceError) -> bool {
        self.deliver(Err(error)).await
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the subscriber unsubscribes.
    pub async fn unsubscribed(&self) {
        self.cancel.cancelled().await
    }

    async fn deliver(&self, item: Item) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.sender.send(item) => sent.is_ok(),
        }
    }
}
