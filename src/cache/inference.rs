//! Keyed deduplication of LLM calls.
//!
//! [`InferenceCache`] caches successful generations keyed on every
//! request-shaping input (prompt, system prompt, model, temperature,
//! max tokens, context flags — see
//! [`InferenceRequest::cache_key`](crate::InferenceRequest::cache_key)).
//! Failed backend calls are never cached.
//!
//! # Eviction
//!
//! Capacity eviction is FIFO by insertion age, not LRU: when full, the
//! single globally-oldest entry is dropped regardless of how often it
//! was read.
//!
//! TTL expiry is lazy: an entry older than the TTL is treated as a miss
//! and removed on the next access to its key; there is no background sweep.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::telemetry;
use crate::types::InferenceResponse;

/// Configuration for the inference cache.
///
/// ```rust
/// # use callsift::InferenceCacheConfig;
/// # use std::time::Duration;
/// let config = InferenceCacheConfig::new()
///     .max_entries(1000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct InferenceCacheConfig {
    /// Maximum number of cached responses. Default: 1000.
    pub max_entries: usize,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for InferenceCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl InferenceCacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached responses.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

struct CacheEntry {
    response: InferenceResponse,
    created_at: Instant,
}

/// Aggregate cache counters for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// In-memory cache for LLM responses, shared across concurrent requests.
///
/// The map is mutex-guarded: the get path also mutates (lazy TTL removal),
/// and capacity eviction must observe a consistent oldest entry.
pub struct InferenceCache {
    entries: Mutex<HashMap<u64, CacheEntry>>,
    config: InferenceCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InferenceCache {
    /// Create a new cache with the given configuration.
    pub fn new(config: InferenceCacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached response.
    ///
    /// Returns an independent copy with `processing_time` zeroed and the
    /// timestamp refreshed to retrieval time. Entries past the TTL are
    /// removed here and reported as misses.
    pub fn get(&self, key: u64) -> Option<InferenceResponse> {
        let mut entries = self.entries.lock().expect("inference cache poisoned");
        match entries.get(&key) {
            Some(entry) if entry.created_at.elapsed() < self.config.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "generate")
                    .increment(1);
                Some(entry.response.as_cache_hit())
            }
            Some(_) => {
                entries.remove(&key);
                self.record_miss();
                None
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    /// Insert a successful response.
    ///
    /// At capacity, the single oldest entry by insertion time is dropped
    /// first. Inserting under an existing key replaces it in place.
    pub fn set(&self, key: u64, response: InferenceResponse) {
        let mut entries = self.entries.lock().expect("inference cache poisoned");
        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(k, _)| *k)
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                response,
                created_at: Instant::now(),
            },
        );
    }

    /// Drop all cached entries.
    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("inference cache poisoned")
            .clear();
        tracing::info!("inference cache cleared");
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.lock().expect("inference cache poisoned").len(),
            max_entries: self.config.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "generate").increment(1);
    }
}
