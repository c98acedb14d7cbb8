use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum-spacing limiter derived from a requests-per-minute ceiling.
///
/// `try_acquire` never sleeps: a call arriving early is refused so the
/// scheduler degrades to skipping the cycle instead of queuing work.
pub struct RateLimiter {
    min_spacing: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1) as u64;
        Self {
            min_spacing: Duration::from_millis(60_000 / rpm),
            last_call: Mutex::new(None),
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut last = self
            .last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < self.min_spacing => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
