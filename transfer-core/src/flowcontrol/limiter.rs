// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Bandwidth Limiter
//!
//! A token bucket with capacity equal to one second of the configured
//! rate. Tokens accrue continuously; `acquire` blocks the caller only
//! long enough for the bucket to cover the requested amount. `rate == 0`
//! disables limiting entirely - every acquire returns immediately.

use std::time::Instant;

use parking_lot::Mutex;
use tokio::time::Duration;

struct State {
    /// May go negative: an `acquire` commits its deduction immediately and
    /// sleeps off the resulting deficit, rather than waiting under lock.
    tokens: f64,
    capacity: f64,
    rate: f64,
    last_refill: Instant,
}

impl State {
    fn refill(&mut self) {
        if self.rate == 0.0 {
            return;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Shared, thread-safe rate limiter for one transfer's outbound chunks.
pub struct BandwidthLimiter {
    state: Mutex<State>,
}

impl BandwidthLimiter {
    /// `rate_bytes_per_sec == 0` creates a disabled limiter.
    pub fn new(rate_bytes_per_sec: u64) -> Self {
        let rate = rate_bytes_per_sec as f64;
        Self {
            state: Mutex::new(State {
                tokens: rate,
                capacity: rate,
                rate,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Deducts `n` tokens, waiting if the bucket doesn't currently cover
    /// the request. A disabled limiter (`rate == 0`) never waits.
    pub async fn acquire(&self, n: u64) {
        let wait = {
            let mut state = self.state.lock();
            state.refill();
            if state.rate == 0.0 {
                return;
            }
            state.tokens -= n as f64;
            if state.tokens >= 0.0 {
                None
            } else {
                Some(Duration::from_secs_f64(-state.tokens / state.rate))
            }
        };

        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
    }

    /// Non-blocking: deducts `n` tokens and returns `true` only if the
    /// bucket already covered the request; otherwise leaves the bucket
    /// untouched and returns `false`. Always `true` when disabled.
    pub fn try_acquire(&self, n: u64) -> bool {
        let mut state = self.state.lock();
        state.refill();
        if state.rate == 0.0 {
            return true;
        }
        if state.tokens >= n as f64 {
            state.tokens -= n as f64;
            true
        } else {
            false
        }
    }

    /// Changes the rate (and capacity, which tracks it 1:1) without
    /// moving the current token count.
    pub fn set_limit(&self, rate_bytes_per_sec: u64) {
        let mut state = self.state.lock();
        state.refill();
        state.rate = rate_bytes_per_sec as f64;
        state.capacity = rate_bytes_per_sec as f64;
    }

    /// Refills the bucket to full capacity immediately.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = state.capacity;
        state.last_refill = Instant::now();
    }

    pub fn current_rate(&self) -> u64 {
        self.state.lock().rate as u64
    }
}
