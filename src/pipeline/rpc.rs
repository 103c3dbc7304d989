//! Resilient JSON-over-HTTP calls with exponential backoff.
//!
//! ## Retry Strategy
//!
//! LLM APIs answer 429 / 503 routinely under load. Each failed attempt waits
//! `base_delay * 2^attempt` before the next one, so with the defaults
//! (3 attempts, 1 s base) the sequence is 1 s → 2 s and no wait follows the
//! last attempt. Transport errors, non-success statuses and unparseable
//! bodies all count as failed attempts.

use crate::error::CallFailure;
use serde_json::Value;
use std::fmt::{self, Display};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Attempt budget and base delay shared by every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Wait after the failed attempt `attempt` (zero-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// Returns the last error when every attempt fails.
    pub async fn retry<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_retries.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= attempts => return Err(e),
                Err(e) => {
                    let backoff = self.delay_for(attempt);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {}ms",
                        label,
                        attempt + 1,
                        attempts,
                        e,
                        backoff.as_millis()
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Header carrying the Google API key. Keys never go in the URL: `reqwest`
/// errors print it.
pub const API_KEY_HEADER: &str = "x-goog-api-key";

/// HTTP client that POSTs JSON and retries with [`RetryPolicy`].
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    policy: RetryPolicy,
    api_key: Option<String>,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("policy", &self.policy)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RpcClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Result<Self, CallFailure> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            policy,
            api_key: None,
        })
    }

    /// Send `key` in the [`API_KEY_HEADER`] header of every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// POST `body` to `url` and return the parsed JSON response.
    ///
    /// On a non-success status after the final attempt the error is
    /// [`CallFailure::Exhausted`] carrying the last status code.
    pub async fn call_with_backoff(&self, url: &str, body: &Value) -> Result<Value, CallFailure> {
        let http = &self.http;
        let api_key = self.api_key.as_deref();
        let result = self
            .policy
            .retry("rpc", move || {
                let mut request = http.post(url).json(body);
                if let Some(key) = api_key {
                    request = request.header(API_KEY_HEADER, key);
                }
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    if !status.is_success() {
                        let _ = response.bytes().await;
                        return Err(CallFailure::Status {
                            status: status.as_u16(),
                        });
                    }
                    let bytes = response.bytes().await?;
                    debug!("rpc: {} response bytes", bytes.len());
                    serde_json::from_slice::<Value>(&bytes)
                        .map_err(|e| CallFailure::InvalidBody(e.to_string()))
                }
            })
            .await;

        result.map_err(|e| match e {
            CallFailure::Status { status } => CallFailure::Exhausted {
                attempts: self.policy.max_retries,
                status,
            },
            other => other,
        })
    }
}
