//! Per-source fetch policy: rate limiting and circuit breaking
//!
//! Every source worker owns one [`PolicyState`]; limiter and breaker state
//! is never shared across sources or across workers. The token bucket
//! (governor) refills continuously at `rate_limit_per_minute / 60` tokens
//! per second with capacity equal to the per-minute rate, so `acquire()`
//! is a bounded wait that never errors.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tracing::warn;

use crate::config::FetchConfig;

/// Process-wide fetch policy, read-only during a run
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub rate_limit_per_minute: u32,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from(&crate::config::Config::default().fetch)
    }
}

impl From<&FetchConfig> for FetchPolicy {
    fn from(cfg: &FetchConfig) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.timeout_secs),
            max_retries: cfg.max_retries,
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
            rate_limit_per_minute: cfg.rate_limit_per_minute,
            breaker_threshold: cfg.breaker_threshold,
            breaker_cooldown: Duration::from_secs(cfg.breaker_cooldown_secs),
        }
    }
}

/// Failure-count circuit breaker with a cooldown window.
///
/// `record_success` clears the failure counter but never closes an
/// already-open breaker early; the cooldown always runs its course.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failure_count: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            failure_count: 0,
            open_until: None,
        }
    }

    /// False while the breaker is open
    pub fn allow_request(&self) -> bool {
        match self.open_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    /// Record a failure; at `threshold` failures since the last success
    /// the breaker opens for the cooldown period
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        if self.failure_count >= self.threshold {
            self.open_until = Some(Instant::now() + self.cooldown);
            warn!(
                failures = self.failure_count,
                cooldown_secs = self.cooldown.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    /// Clear the failure counter (does not close an open breaker early)
    pub fn record_success(&mut self) {
        self.failure_count = 0;
    }

    #[cfg(test)]
    fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

/// Mutable per-source runtime state, owned by one worker
pub struct PolicyState {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    pub breaker: CircuitBreaker,
}

impl PolicyState {
    pub fn new(policy: &FetchPolicy) -> Self {
        let rate =
            NonZeroU32::new(policy.rate_limit_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(rate));

        Self {
            limiter,
            breaker: CircuitBreaker::new(policy.breaker_threshold, policy.breaker_cooldown),
        }
    }

    /// Block until a rate-limit token is available; bounded wait, no error
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}
