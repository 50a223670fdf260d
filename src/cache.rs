//! TTL-keyed address cache
//!
//! Maps lookup keys to resolved addresses with a per-entry expiration instant.
//! The cache is a plain TTL store: no capacity bound, no LRU. Expired entries
//! are removed lazily when a reader encounters them; until then they behave as
//! absent, so no stale address is ever returned.
//!
//! Policy for non-positive TTLs: a zero TTL on [`AddressCache::set`] is
//! replaced with [`DEFAULT_TTL`], matching the TTL extractor's own fallback.
//!
//! The cache is an explicit service object rather than process-global state;
//! create one per resolver (tests get isolation for free) and share it behind
//! an `Arc`. Internal synchronization comes from `DashMap` sharding, so
//! concurrent `get`/`set` from many lookups need no external locking.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fallback TTL applied when the backend supplies none, an unparseable one,
/// or zero.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Upper bound on accepted TTLs. DNS caps TTLs at 2^31 - 1 seconds
/// (RFC 2181); anything above is clamped, which also keeps the expiry
/// arithmetic clear of `Instant` overflow on backend-controlled input.
pub const MAX_TTL: Duration = Duration::from_secs((1 << 31) - 1);

/// A cached address with its absolute expiration instant.
#[derive(Debug, Clone)]
struct CacheEntry {
    address: String,
    expires_at: Instant,
}

/// Concurrent lookup-key → address cache with per-entry TTL.
///
/// # Examples
///
/// ```
/// use fetchdns::cache::AddressCache;
/// use std::time::Duration;
///
/// let cache = AddressCache::new();
/// cache.set("host1", "10.0.0.2", Duration::from_secs(300));
/// assert_eq!(cache.get("host1"), Some("10.0.0.2".to_string()));
/// assert_eq!(cache.get("other"), None);
/// ```
#[derive(Debug, Default)]
pub struct AddressCache {
    entries: DashMap<String, CacheEntry>,
}

impl AddressCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the cached address for `key`, or `None` if there is no entry or
    /// the entry has expired.
    ///
    /// An expired entry found here is removed before returning `None`, so the
    /// map does not accumulate dead entries for keys that are still queried.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => return Some(entry.address.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            // Re-check under the removal lock: a concurrent set may have
            // refreshed the entry since the read above.
            let removed = self
                .entries
                .remove_if(key, |_, entry| now >= entry.expires_at);
            if removed.is_some() {
                debug!("evicted expired cache entry for {}", key);
            }
        }
        None
    }

    /// Stores `address` under `key` for `ttl`, overwriting any existing entry.
    ///
    /// A zero `ttl` is replaced with [`DEFAULT_TTL`]; a `ttl` beyond
    /// [`MAX_TTL`] is clamped to it.
    pub fn set(&self, key: &str, address: &str, ttl: Duration) {
        let ttl = if ttl.is_zero() {
            DEFAULT_TTL
        } else {
            if ttl > MAX_TTL {
                warn!("TTL {}s exceeds the cap, clamping to {}s", ttl.as_secs(), MAX_TTL.as_secs());
            }
            ttl.min(MAX_TTL)
        };
        let now = Instant::now();
        // TTL is backend-controlled input; the expiry math must not panic
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(DEFAULT_TTL))
            .unwrap_or(now);
        let entry = CacheEntry {
            address: address.to_string(),
            expires_at,
        };
        debug!("caching {} -> {} for {:?}", key, address, ttl);
        self.entries.insert(key.to_string(), entry);
    }

    /// Time left until the entry for `key` expires, or `None` if there is no
    /// live entry.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .and_then(|entry| entry.expires_at.checked_duration_since(Instant::now()))
    }

    /// Raw entry count. May include expired entries that no reader has
    /// touched yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
