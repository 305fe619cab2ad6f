use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Sliding-window rate limiter guarding the primary news API budget.
///
/// At most `max_calls` slots are granted within any `window`-long interval.
/// Waiters queue on a fair mutex, so slots are granted in request order.
/// Uses tokio's clock, which lets tests drive it with a paused runtime.
pub struct RateLimiter {
    /// Fair (FIFO) queue of callers waiting for a slot
    turnstile: tokio::sync::Mutex<()>,
    /// Instants of grants still inside the window, oldest first
    grants: Mutex<VecDeque<Instant>>,
    max_calls: usize,
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_calls` - Slots available per window (Finnhub free tier: 60)
    /// * `window` - Length of the rolling window
    pub fn new(max_calls: usize, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            turnstile: tokio::sync::Mutex::new(()),
            grants: Mutex::new(VecDeque::with_capacity(max_calls)),
            max_calls,
            window,
        }
    }

    pub fn per_minute(max_calls: usize) -> Self {
        Self::new(max_calls, Duration::from_secs(60))
    }

    /// Wait until a call slot is available and claim it.
    ///
    /// Never fails; it only delays. Dropping the future while waiting gives
    /// up the place in line without consuming a slot.
    pub async fn acquire(&self) {
        let _turn = self.turnstile.lock().await;

        loop {
            let wait_time = {
                let mut grants = self.grants.lock();
                let now = Instant::now();

                while let Some(&oldest) = grants.front() {
                    if now.duration_since(oldest) >= self.window {
                        grants.pop_front();
                    } else {
                        break;
                    }
                }

                if grants.len() < self.max_calls {
                    grants.push_back(now);
                    None
                } else {
                    grants
                        .front()
                        .map(|&oldest| self.window - now.duration_since(oldest))
                }
            }; // Lock is dropped here

            match wait_time {
                None => return,
                Some(delay) => sleep(delay).await,
            }
        }
    }

    /// Slots that could be granted right now without waiting (for logging).
    pub fn available_slots(&self) -> usize {
        let grants = self.grants.lock();
        let now = Instant::now();
        let in_window = grants
            .iter()
            .filter(|&&at| now.duration_since(at) < self.window)
            .count();
        self.max_calls.saturating_sub(in_window)
    }
}
