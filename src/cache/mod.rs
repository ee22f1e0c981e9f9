//! Caching of expensive inference results.

mod inference;

pub use inference::{CacheStats, InferenceCache, InferenceCacheConfig};
