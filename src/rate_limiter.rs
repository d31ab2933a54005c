//! A thread-safe token-bucket rate limiter, used to keep every outbound
//! request to the public host polite (§4.2, §5).
//!
//! Grounded directly on the ancestor implementation's `RateLimiter`: a
//! mutex-protected float bucket refilled by elapsed wall-clock time,
//! `wait()` blocks in a poll loop, `try_acquire()` never blocks.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

struct State {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> RateLimiter {
        RateLimiter {
            rate,
            burst: burst as f64,
            state: Mutex::new(State {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last_refill = now;
    }

    /// Attempts to take one token without blocking. Returns `true` if a
    /// token was available and consumed.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Blocks the calling thread, polling every 100ms, until a token is
    /// available, then consumes it.
    pub fn wait(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use rate_limiter::*;

    #[test]
    fn test_burst_allows_immediate_acquires() {
        let limiter = RateLimiter::new(0.5, 2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_wait_eventually_returns() {
        let limiter = RateLimiter::new(1000.0, 1);
        assert!(limiter.try_acquire());
        // Refills fast enough that wait() returns promptly.
        limiter.wait();
    }
}
