//! Rate governor - per-collector token buckets
//!
//! One bucket per collector name, lazily created on first use. Burst size is
//! fixed at 1 so no collector can exceed its steady rate even after sitting
//! idle. Waiting suspends the calling task until a token is available or the
//! caller-supplied deadline fires; the wait is never silently skipped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Errors from rate-limit waits
#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("rate-limit wait for '{0}' cancelled by deadline")]
    Cancelled(String),
}

/// Built-in steady rates in tokens per second.
fn builtin_rate(name: &str) -> f64 {
    match name {
        "dns" => 10.0,
        "whois" => 1.0,
        "github" => 2.0,
        _ => 5.0,
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate: f64) -> Self {
        // Starts full: the first request never waits.
        Self {
            tokens: 1.0,
            rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(1.0);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until a full token will have accumulated.
    fn time_to_token(&self) -> Duration {
        let deficit = (1.0 - self.tokens).max(0.0);
        Duration::from_secs_f64(deficit / self.rate)
    }
}

/// Per-collector token-bucket rate limiting.
///
/// The bucket map is the only shared-mutable state; insertion and consumption
/// both go through one mutex held for microseconds.
#[derive(Debug, Default)]
pub struct RateGovernor {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    overrides: Mutex<HashMap<String, f64>>,
}

impl RateGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the steady rate for a collector (e.g. from config). Resets the
    /// collector's bucket.
    pub fn set_limit(&self, name: &str, rate_per_sec: f64) {
        let rate = rate_per_sec.max(0.001);
        self.overrides.lock().insert(name.to_string(), rate);
        self.buckets
            .lock()
            .insert(name.to_string(), TokenBucket::new(rate));
    }

    fn rate_for(&self, name: &str) -> f64 {
        self.overrides
            .lock()
            .get(name)
            .copied()
            .unwrap_or_else(|| builtin_rate(name))
    }

    /// Consume a token without waiting. Returns false if the bucket is empty.
    pub fn try_acquire(&self, name: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let rate = self.rate_for(name);
        buckets
            .entry(name.to_string())
            .or_insert_with(|| TokenBucket::new(rate))
            .try_consume()
    }

    /// Tokens currently available for a collector, without consuming any.
    pub fn available(&self, name: &str) -> f64 {
        let mut buckets = self.buckets.lock();
        let rate = self.rate_for(name);
        let bucket = buckets
            .entry(name.to_string())
            .or_insert_with(|| TokenBucket::new(rate));
        bucket.refill();
        bucket.tokens
    }

    /// Suspend until a token is available for the named collector.
    pub async fn wait(&self, name: &str) {
        loop {
            let delay = {
                let mut buckets = self.buckets.lock();
                let rate = self.rate_for(name);
                let bucket = buckets
                    .entry(name.to_string())
                    .or_insert_with(|| TokenBucket::new(rate));
                if bucket.try_consume() {
                    return;
                }
                bucket.time_to_token()
            };
            debug!(collector = name, ?delay, "rate limited, waiting");
            tokio::time::sleep(delay).await;
        }
    }

    /// Like [`wait`](Self::wait), but gives up when the deadline fires.
    pub async fn wait_with_deadline(
        &self,
        name: &str,
        deadline: Duration,
    ) -> Result<(), GovernorError> {
        tokio::time::timeout(deadline, self.wait(name))
            .await
            .map_err(|_| GovernorError::Cancelled(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_acquire_succeeds() {
        let governor = RateGovernor::new();
        assert!(governor.try_acquire("whois"));
    }

    #[test]
    fn test_burst_of_one() {
        let governor = RateGovernor::new();
        governor.set_limit("probe", 0.5);
        assert!(governor.try_acquire("probe"));
        // Second immediate acquire must fail: burst is 1, refill is 2s/token.
        assert!(!governor.try_acquire("probe"));
    }

    #[test]
    fn test_unknown_collector_gets_fallback_rate() {
        let governor = RateGovernor::new();
        assert!(governor.try_acquire("never-heard-of-it"));
        assert!(governor.available("never-heard-of-it") < 1.0);
    }

    #[tokio::test]
    async fn test_wait_refills_over_time() {
        let governor = RateGovernor::new();
        governor.set_limit("fast", 1000.0);
        governor.wait("fast").await;
        governor.wait("fast").await; // ~1ms refill, should not hang
    }

    #[tokio::test]
    async fn test_wait_deadline_cancels() {
        let governor = RateGovernor::new();
        governor.set_limit("slow", 0.01); // 100s per token
        assert!(governor.try_acquire("slow"));

        let result = governor
            .wait_with_deadline("slow", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(GovernorError::Cancelled(_))));
    }
}
