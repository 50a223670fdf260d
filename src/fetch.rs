//! HTTP fetch execution with bounded retry
//!
//! The [`Fetcher`] owns a pooled `reqwest` client and runs one fully built
//! request per cache miss under a fixed retry policy: up to
//! [`RetryPolicy::max_attempts`] attempts with a flat delay between them. An
//! attempt succeeds when the status lands in the [200, 400) band; redirects
//! count as success at the transport layer, so the client is built with
//! redirect following disabled and extraction runs on whatever body the
//! backend returned.
//!
//! When attempts are exhausted the *last* failure wins: a network-level error
//! surfaces as [`QueryError::Transport`], a non-success status as
//! [`QueryError::Status`] carrying the code and body.
//!
//! Cancellation is cooperative through future drop: a caller that stops
//! polling the returned future abandons the retry loop at the next await
//! point without affecting success/failure semantics for callers that keep
//! polling.

use reqwest::{Client, ClientBuilder};
use std::ops::Range;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::QueryError;
use crate::request::{build_body, build_headers, build_url};

/// Status range treated as a usable response.
pub const SUCCESS_BAND: Range<u16> = 200..400;

/// Bounded fixed-interval retry policy.
///
/// The defaults (10 attempts, 1 second apart) bound a fully failing lookup at
/// roughly ten seconds of backoff plus transport latency.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts per fetch (at least 1 is always made).
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Executes configured HTTP requests against the backend with retries.
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    /// Creates a fetcher with a pooled client and the default retry policy.
    ///
    /// The client disables redirect following (the success band already
    /// treats 3xx as usable responses) and keeps connections warm for
    /// repeated lookups against the same backend.
    ///
    /// # Arguments
    /// * `timeout` - Per-attempt request timeout
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("fetchdns/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            policy: RetryPolicy::default(),
        })
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetches the response body for `key` from the configured backend.
    ///
    /// Builds the URL, headers, and body from `config`, then attempts the
    /// request up to the policy bound, sleeping the fixed delay between
    /// attempts. The body of a success-band response is read fully into
    /// memory before returning; a failure while reading it counts as a
    /// transport error.
    pub async fn fetch(&self, config: &FetchConfig, key: &str) -> Result<String, QueryError> {
        let url = build_url(&config.base_url, config.query_template.as_deref(), key);
        let headers = build_headers(&config.headers);
        let payload = build_body(config.body_template.as_deref(), key);
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("sending {} {} (attempt {}/{})", config.method, url, attempt, max_attempts);

            let mut request = self
                .client
                .request(config.method.clone(), &url)
                .headers(headers.clone());
            if let Some(ref body) = payload {
                request = request.body(body.clone());
            }

            match request.send().await {
                Ok(response) if SUCCESS_BAND.contains(&response.status().as_u16()) => {
                    return response.text().await.map_err(|source| {
                        QueryError::Transport {
                            attempts: attempt,
                            source,
                        }
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if attempt >= max_attempts {
                        return Err(QueryError::Status {
                            status,
                            body,
                            attempts: attempt,
                        });
                    }
                    warn!("HTTP status {} from {}, will retry", status, url);
                }
                Err(source) => {
                    if attempt >= max_attempts {
                        return Err(QueryError::Transport {
                            attempts: attempt,
                            source,
                        });
                    }
                    warn!("transport error fetching {}, will retry: {}", url, source);
                }
            }

            sleep(self.policy.retry_delay).await;
        }
    }
}
