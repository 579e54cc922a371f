//! Policy-governed HTTP fetcher
//!
//! Wraps a shared `reqwest::Client` with the per-source fetch policy:
//! - rate-limit token acquisition before every attempt
//! - circuit breaker check before any network call
//! - bounded retries with exponential backoff and jitter for transient
//!   failures (timeouts, connection errors, 429, 5xx)
//! - a per-run status histogram entry for every outcome
//!
//! 401/403 count toward the breaker but are never retried; other 4xx are
//! terminal without breaker impact.

use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tracing::{debug, warn};

use crate::ingest::policy::{FetchPolicy, PolicyState};
use crate::models::{bump, StatusHistogram};
use crate::utils::error::FetchError;

/// A completed fetch: final status, body text, and the URL after redirects
#[derive(Debug)]
pub struct FetchSuccess {
    pub status: u16,
    pub body: String,
    pub final_url: String,
}

/// HTTP fetcher shared across source workers; all mutable policy state
/// lives in the per-source [`PolicyState`] passed to [`Fetcher::fetch`]
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(policy: &FetchPolicy, user_agent: &str) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(policy.timeout)
            .user_agent(user_agent)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch a URL under the given policy.
    ///
    /// Fails immediately with [`FetchError::CircuitOpen`] when the breaker
    /// is open, without touching the network. Otherwise makes up to
    /// `max_retries + 1` attempts, each preceded by a rate-limit token
    /// acquisition.
    pub async fn fetch(
        &self,
        url: &str,
        policy: &FetchPolicy,
        state: &mut PolicyState,
        histogram: &mut StatusHistogram,
    ) -> Result<FetchSuccess, FetchError> {
        if !state.breaker.allow_request() {
            bump(histogram, "circuit_open");
            return Err(FetchError::CircuitOpen);
        }

        let mut attempt: u32 = 0;
        loop {
            state.acquire().await;

            let error = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if (200..300).contains(&status) {
                        let final_url = response.url().to_string();
                        match response.text().await {
                            Ok(body) => {
                                bump(histogram, status.to_string());
                                state.breaker.record_success();
                                return Ok(FetchSuccess {
                                    status,
                                    body,
                                    final_url,
                                });
                            }
                            Err(err) => classify_reqwest_error(&err),
                        }
                    } else {
                        bump(histogram, status.to_string());
                        if (500..600).contains(&status) {
                            bump(histogram, "5xx");
                        }
                        FetchError::HttpStatus(status)
                    }
                }
                Err(err) => classify_reqwest_error(&err),
            };

            // Network-level errors get their own histogram key; HTTP error
            // statuses were already counted above
            if !matches!(error, FetchError::HttpStatus(_)) {
                bump(histogram, error.kind());
            }

            let breaker_failure = match &error {
                FetchError::Timeout | FetchError::Connect(_) | FetchError::Request(_) => true,
                FetchError::HttpStatus(status) => {
                    *status == 429 || *status == 401 || *status == 403 || *status >= 500
                }
                FetchError::CircuitOpen => false,
            };
            if breaker_failure {
                state.breaker.record_failure();
            }

            if !error.is_transient() || attempt >= policy.max_retries {
                warn!(url, attempt, error = %error, "fetch failed");
                return Err(error);
            }
            if !state.breaker.allow_request() {
                bump(histogram, "circuit_open");
                return Err(FetchError::CircuitOpen);
            }

            let delay = backoff_delay(policy.backoff_base, attempt);
            debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying fetch");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// `base * 2^attempt` plus uniform jitter of up to a quarter of the base
/// (at least 50ms of jitter range)
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt));
    let jitter_ceiling = (base.as_millis() as u64 / 4).max(50);
    let jitter = rand::thread_rng().gen_range(0..=jitter_ceiling);
    exp + Duration::from_millis(jitter)
}

fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else {
        FetchError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially() {
        let base = Duration::from_millis(400);
        let d0 = backoff_delay(base, 0);
        let d2 = backoff_delay(base, 2);

        assert!(d0 >= Duration::from_millis(400));
        assert!(d0 <= Duration::from_millis(500));
        assert!(d2 >= Duration::from_millis(1600));
        assert!(d2 <= Duration::from_millis(1700));
    }

    #[test]
    fn test_backoff_jitter_floor() {
        // With a tiny base the jitter range still spans 50ms
        let base = Duration::from_millis(10);
        for _ in 0..20 {
            let d = backoff_delay(base, 0);
            assert!(d >= Duration::from_millis(10));
            assert!(d <= Duration::from_millis(60));
        }
    }
}
