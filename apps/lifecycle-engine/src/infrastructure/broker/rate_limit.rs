//! Broker call pacing and retry backoff.
//!
//! Every broker call (orders, status, cancels, positions) goes through one
//! shared [`RateLimiter`] so that no two calls are closer than the minimum
//! gap. Rate-limited and network failures back off exponentially with
//! jitter.

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RetryConfig;

/// Enforces a minimum gap between consecutive broker calls.
#[derive(Debug)]
pub struct RateLimiter {
    min_gap: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with the given minimum gap.
    #[must_use]
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until a call is allowed, then claim the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_gap;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Exponential backoff with symmetric jitter.
#[derive(Debug)]
pub struct ExponentialBackoff {
    attempt: u32,
    max_attempts: u32,
    initial_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Create a calculator from a retry policy.
    #[must_use]
    pub const fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts,
            initial_ms: config.initial_backoff_ms,
            max_ms: config.max_backoff_ms,
            multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Retries used so far.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Next delay, or `None` once the attempts are spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let base = self.base_ms();
        self.attempt += 1;
        Some(Duration::from_millis(self.jitter(base).min(self.max_ms)))
    }

    fn base_ms(&self) -> u64 {
        let factor = self.multiplier.powi(self.attempt as i32);
        ((self.initial_ms as f64 * factor) as u64).min(self.max_ms)
    }

    fn jitter(&self, base_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 {
            return base_ms;
        }
        let spread = base_ms as f64 * self.jitter_factor;
        let low = (base_ms as f64 - spread).max(0.0);
        rand::rng().random_range(low..=base_ms as f64 + spread) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter_factor: f64) -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
            backoff_multiplier: 2.0,
            jitter_factor,
        }
    }

    #[test]
    fn test_backoff_doubles_until_capped() {
        let mut backoff = ExponentialBackoff::new(&policy(0.0));
        let delays: Vec<u64> = std::iter::from_fn(|| backoff.next_backoff())
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500]);
        assert_eq!(backoff.attempt(), 4);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        for _ in 0..50 {
            let mut backoff = ExponentialBackoff::new(&policy(0.2));
            let first = backoff.next_backoff().unwrap().as_millis();
            assert!((80..=120).contains(&first), "first delay {first}ms");
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(40));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_rate_limiter_does_not_wait_after_idle() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let before = Instant::now();
        limiter.acquire().await;

        assert!(before.elapsed() < Duration::from_millis(20));
    }
}
