use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Spaces out requests to one endpoint by a fixed minimum interval.
/// Shared (behind an `Arc`) by every concurrent batch so the spacing
/// holds across all of them.
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait for the next free slot and claim it. Returns how long we waited.
    pub async fn acquire(&self) -> Duration {
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_slot = Some(slot + self.min_interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            let wait = slot - now;
            debug!("Rate limiting: waiting {:?}", wait);
            tokio::time::sleep_until(slot).await;
            wait
        } else {
            Duration::ZERO
        }
    }
}
