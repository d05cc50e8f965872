//! Rate-limited access to the reasoning service
//!
//! Every outbound request first waits for the pacing quota (one request per
//! `min_gap`). Throttling failures are retried with exponential backoff
//! (`base_delay * 2^attempt`) up to `max_retries` times; every other failure
//! is returned immediately.

use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::reasoning::ReasoningClient;
use crate::telemetry::duration_millis;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Wraps a [`ReasoningClient`] with pacing and throttling retries
pub struct RateLimitedCaller {
    client: Arc<dyn ReasoningClient>,
    policy: RetryPolicy,
    // None when min_gap is zero
    pacer: Option<DefaultDirectRateLimiter>,
    last_call: Mutex<Option<DateTime<Utc>>>,
    attempts: AtomicU64,
}

impl RateLimitedCaller {
    /// Create a caller with the given policy
    pub fn new(client: Arc<dyn ReasoningClient>, policy: RetryPolicy) -> Self {
        let pacer = Quota::with_period(policy.min_gap).map(RateLimiter::direct);
        Self {
            client,
            policy,
            pacer,
            last_call: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// The active policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// When the last request was issued
    pub fn last_call(&self) -> Option<DateTime<Utc>> {
        *self.last_call.lock()
    }

    /// Total requests issued, retries included
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Call the reasoning service.
    ///
    /// Returns [`Error::RateLimitExceeded`] once the retry budget is spent on
    /// throttling responses.
    pub async fn call(&self, prompt: &str) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            self.pace().await;

            match self.client.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_throttling() => {
                    if attempt >= self.policy.max_retries {
                        tracing::warn!(
                            client = self.client.client_type(),
                            attempts = attempt + 1,
                            "reasoning service still throttling, giving up"
                        );
                        return Err(Error::RateLimitExceeded {
                            attempts: attempt + 1,
                            message: e.to_string(),
                        });
                    }
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        client = self.client.client_type(),
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_retries + 1,
                        delay_ms = duration_millis(delay),
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn pace(&self) {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }
        *self.last_call.lock() = Some(Utc::now());
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for RateLimitedCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedCaller")
            .field("client", &self.client.client_type())
            .field("policy", &self.policy)
            .field("attempts", &self.attempts())
            .finish()
    }
}
