//! Minimum-interval gate between two audible horn activations.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct AlertThrottle {
    min_interval: Duration,
    last_fire: Option<Instant>,
}

impl AlertThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_fire: None,
        }
    }

    /// Claim the right to fire now.
    ///
    /// Returns `true` and records the fire time if no fire has happened yet
    /// or at least `min_interval` has passed since the last one. Otherwise
    /// returns `false` without touching any state.
    pub fn try_fire(&mut self) -> bool {
        let now = Instant::now();
        let allowed = match self.last_fire {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        };
        if allowed {
            self.last_fire = Some(now);
        }
        allowed
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
