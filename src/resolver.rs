//! Lookup orchestration: cache, fetch, extract, store
//!
//! The [`Resolver`] is the public entry point of the engine. Each lookup
//! walks a fixed sequence: consult the cache, on a miss fetch from the
//! backend, extract the address and TTL from the response body, populate the
//! cache, return the address. An empty extracted address means "no record
//! found": returned as an empty string with no error and never cached, so a
//! newly provisioned record is picked up on the next lookup.
//!
//! Concurrent misses for the same key issue independent fetches; the last
//! cache store to complete wins. This redundancy is accepted in exchange for
//! a lock-free hot path; nothing here holds a lock across the network call.

use futures::{stream, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::AddressCache;
use crate::config::FetchConfig;
use crate::error::QueryError;
use crate::extract::Extractor;
use crate::fetch::Fetcher;

/// Outcome of one lookup, shaped for serialized output.
///
/// `address` is `None` both on error and on "no record found"; the two are
/// told apart by `error`.
#[derive(Debug, Clone, Serialize)]
pub struct LookupOutcome {
    /// The lookup key that was resolved
    pub key: String,
    /// The resolved address, if one was found
    pub address: Option<String>,
    /// Error message if the lookup failed
    pub error: Option<String>,
}

/// Counter snapshot exposed for observability.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fetch_failures: u64,
}

#[derive(Debug, Default)]
struct ResolverStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fetch_failures: AtomicU64,
}

/// Resolves lookup keys to addresses via an HTTP backend, with caching.
///
/// All shared state (address cache, compiled-program cache, HTTP connection
/// pool) lives in injected service objects behind `Arc`s, so cloning a
/// resolver is cheap and every clone shares the same caches.
///
/// # Examples
///
/// ```no_run
/// use fetchdns::config::FetchConfig;
/// use fetchdns::resolver::Resolver;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let resolver = Resolver::new(Duration::from_secs(5))?;
/// let config = FetchConfig::new("https://svc/ip/")?.with_query_template("name={key}");
///
/// let address = resolver.query(&config, "host1").await?;
/// if address.is_empty() {
///     println!("no record");
/// } else {
///     println!("{}", address);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Resolver {
    fetcher: Arc<Fetcher>,
    extractor: Arc<Extractor>,
    cache: Arc<AddressCache>,
    stats: Arc<ResolverStats>,
}

impl Resolver {
    /// Creates a resolver with default retry policy and fresh caches.
    ///
    /// # Arguments
    /// * `timeout` - Per-attempt HTTP request timeout
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::with_fetcher(Fetcher::new(timeout)?))
    }

    /// Creates a resolver around a custom-configured [`Fetcher`].
    pub fn with_fetcher(fetcher: Fetcher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(Extractor::new()),
            cache: Arc::new(AddressCache::new()),
            stats: Arc::new(ResolverStats::default()),
        }
    }

    /// Resolves `key` against the backend described by `config`.
    ///
    /// Returns the address, or an empty string when the backend has no record
    /// for the key. Transport, status, and address-extraction failures
    /// propagate as [`QueryError`]; TTL extraction problems only downgrade
    /// the cache TTL to its default.
    pub async fn query(&self, config: &FetchConfig, key: &str) -> Result<String, QueryError> {
        if let Some(address) = self.cache.get(key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("cache hit for {}", key);
            return Ok(address);
        }
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let body = match self.fetcher.fetch(config, key).await {
            Ok(body) => body,
            Err(e) => {
                self.stats.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!("fetch failed for {}: {}", key, e);
                return Err(e);
            }
        };
        debug!("response body for {}: {}", key, body);

        let address = self
            .extractor
            .extract(config.address_extractor.as_deref().unwrap_or(""), &body)?;
        if address.is_empty() {
            info!("no record for {} in response", key);
            return Ok(String::new());
        }

        let ttl = self
            .extractor
            .extract_ttl(config.ttl_extractor.as_deref(), &body);
        self.cache.set(key, &address, ttl);

        Ok(address)
    }

    /// Resolves many keys concurrently, at most `concurrency` in flight.
    ///
    /// Per-key failures are folded into the returned outcomes rather than
    /// aborting the batch. Outcomes arrive in completion order.
    pub async fn query_many(
        &self,
        config: &FetchConfig,
        keys: Vec<String>,
        concurrency: usize,
    ) -> Vec<LookupOutcome> {
        stream::iter(keys)
            .map(|key| async move {
                match self.query(config, &key).await {
                    Ok(address) if address.is_empty() => LookupOutcome {
                        key,
                        address: None,
                        error: None,
                    },
                    Ok(address) => LookupOutcome {
                        key,
                        address: Some(address),
                        error: None,
                    },
                    Err(e) => LookupOutcome {
                        key,
                        address: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }

    /// The address cache shared by this resolver and its clones.
    pub fn cache(&self) -> &AddressCache {
        &self.cache
    }

    /// The extractor (and compiled-program cache) shared by this resolver.
    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            fetch_failures: self.stats.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

impl Clone for Resolver {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            cache: Arc::clone(&self.cache),
            stats: Arc::clone(&self.stats),
        }
    }
}
