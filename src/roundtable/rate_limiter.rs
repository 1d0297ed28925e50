//! Rolling-window admission control for model calls.
//!
//! A [`RateLimiter`] admits at most `limit` calls in any trailing `interval`. Callers over
//! budget are suspended until the oldest admission ages out of the window, so
//! [`check_limit`](RateLimiter::check_limit) never fails; it only waits.
//!
//! The admission log sits behind a `tokio::sync::Mutex` that is held across the wait.
//! Concurrent callers therefore queue on the lock and are admitted one at a time, which
//! rules out two callers both observing a free slot.
//!
//! # Example
//!
//! ```rust
//! use roundtable::rate_limiter::RateLimiter;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let limiter = RateLimiter::new(2, Duration::from_millis(50));
//! limiter.check_limit().await;
//! limiter.check_limit().await;
//! assert_eq!(limiter.available().await, 0);
//! limiter.check_limit().await; // waits ~50ms for the window to roll
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Admits at most `limit` calls per rolling `interval`.
pub struct RateLimiter {
    limit: usize,
    interval: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. A `limit` of zero is clamped to one admission per interval.
    pub fn new(limit: usize, interval: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            interval,
            admissions: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a call may proceed, then record the admission.
    pub async fn check_limit(&self) {
        let mut admissions = self.admissions.lock().await;
        let now = Instant::now();
        Self::expire(&mut admissions, now, self.interval);

        if admissions.len() >= self.limit {
            if let Some(&oldest) = admissions.front() {
                let wait = (oldest + self.interval).saturating_duration_since(now);
                log::debug!(
                    "RateLimiter::check_limit(...): {} admissions in window, waiting {:?}",
                    admissions.len(),
                    wait
                );
                tokio::time::sleep(wait).await;
            }
            Self::expire(&mut admissions, Instant::now(), self.interval);
        }

        admissions.push_back(Instant::now());
    }

    /// Admissions that would be granted right now without waiting.
    pub async fn available(&self) -> usize {
        let mut admissions = self.admissions.lock().await;
        Self::expire(&mut admissions, Instant::now(), self.interval);
        self.limit - admissions.len()
    }

    fn expire(admissions: &mut VecDeque<Instant>, now: Instant, interval: Duration) {
        while let Some(&oldest) = admissions.front() {
            if now.saturating_duration_since(oldest) >= interval {
                admissions.pop_front();
            } else {
                break;
            }
        }
    }
}
