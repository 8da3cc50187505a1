//! Simulated position provider.
//!
//! Walks a circle around an origin, one fix per interval, so the tracker can
//! run without a real location provider.

use std::{f64::consts::TAU, sync::Arc, time::Duration};

use livetrack_shared::{time::Clock, wire::PositionSample};
use tokio::time::MissedTickBehavior;

use super::{DEFAULT_FEED_CAPACITY, PositionFeed, PositionSource, PositionStream};

/// Fixes per full circle.
const STEPS_PER_LAP: u32 = 36;

/// Circle radius in degrees (roughly 100 m of latitude).
const DEFAULT_RADIUS_DEG: f64 = 0.001;

pub struct SimulatedPositionSource {
    origin_lat: f64,
    origin_lng: f64,
    radius_deg: f64,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl SimulatedPositionSource {
    pub fn new(origin_lat: f64, origin_lng: f64, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            origin_lat,
            origin_lng,
            radius_deg: DEFAULT_RADIUS_DEG,
            interval,
            clock,
        }
    }

    pub fn with_radius(mut self, radius_deg: f64) -> Self {
        self.radius_deg = radius_deg;
        self
    }

    fn position_at(&self, step: u32) -> (f64, f64) {
        let angle = TAU * f64::from(step % STEPS_PER_LAP) / f64::from(STEPS_PER_LAP);
        (
            self.origin_lat + self.radius_deg * angle.sin(),
            self.origin_lng + self.radius_deg * angle.cos(),
        )
    }
}

impl PositionSource for SimulatedPositionSource {
    fn subscribe(&self) -> PositionStream {
        let (feed, stream) = PositionStream::channel(DEFAULT_FEED_CAPACITY);
        let walker = Walker {
            path: self.path(),
            interval: self.interval,
            clock: Arc::clone(&self.clock),
        };
        tokio::spawn(walker.run(feed));
        stream
    }
}

impl SimulatedPositionSource {
    fn path(&self) -> Vec<(f64, f64)> {
        (0..STEPS_PER_LAP).map(|step| self.position_at(step)).collect()
    }
}

struct Walker {
    path: Vec<(f64, f64)>,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl Walker {
    async fn run(self, feed: PositionFeed) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for &(latitude, longitude) in self.path.iter().cycle() {
            tokio::select! {
                _ = feed.unsubscribed() => break,
                _ = ticker.tick() => {}
            }
            let sample = PositionSample::new(latitude, longitude, self.clock.now());
            if !feed.publish(sample).await {
                break;
            }
        }
        tracing::debug!("Simulated position source unsubscribed");
    }
}
