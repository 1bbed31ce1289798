//! Start-time throttle for resource copies.
//!
//! Copies may run concurrently, but consecutive copies *start* at least
//! `interval` apart so the destination is not flooded with uploads.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Spaces out the start of consecutive operations.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Create a throttle; a zero interval never waits.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Configured spacing between starts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller's start slot.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };
        sleep_until(slot).await;
    }
}
