//! Embedding generation and in-process similarity search.
//!
//! [`EmbeddingClient`] wraps the embedding backend with a fingerprint
//! cache and an append-only similarity index. Vectors are unit-normalized
//! on the way in, so downstream similarity is a plain inner product.
//!
//! # Batch ordering
//!
//! `embed_batch` partitions inputs into cached and uncached, chunks the
//! uncached texts by the backend's batch size, and dispatches the chunks
//! concurrently. Chunks complete in any order; results are written into
//! positional slots so the output always matches the caller's input
//! order.

mod index;

pub use index::SimilarityIndex;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::config::EmbeddingSettings;
use crate::providers::EmbeddingBackend;
use crate::telemetry;
use crate::types::IndexHit;
use crate::{CallsiftError, Result};

/// Batch cap enforced before any processing begins.
pub const MAX_EMBED_BATCH: usize = 100;

/// A generated (or cache-served) embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub text: String,
    /// Unit-normalized vector. Cached texts share the same allocation.
    pub vector: Arc<Vec<f32>>,
    pub model: String,
    /// Stable content hash of the embedded text.
    pub fingerprint: String,
    /// Zero for cache hits.
    pub processing_time: Duration,
}

/// Aggregate embedding counters for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingStats {
    pub embeddings_generated: u64,
    pub cache_hits: u64,
    pub batch_operations: u64,
    pub cache_size: usize,
    pub indexed_texts: usize,
    pub total_processing_time: Duration,
    pub cache_hit_rate: f64,
}

struct CachedVector {
    vector: Arc<Vec<f32>>,
    inserted_at: Instant,
}

#[derive(Default)]
struct Counters {
    embeddings_generated: AtomicU64,
    cache_hits: AtomicU64,
    batch_operations: AtomicU64,
    total_processing_micros: AtomicU64,
}

/// Report of a bulk corpus-indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusIndexReport {
    pub total: usize,
    pub indexed: usize,
    pub errors: usize,
    pub processing_time: Duration,
}

/// Embedding client: caching, batching, and the similarity index.
pub struct EmbeddingClient {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
    cache_max_entries: usize,
    cache: Mutex<HashMap<String, CachedVector>>,
    index: SimilarityIndex,
    counters: Counters,
}

impl EmbeddingClient {
    /// Create a client over the given backend.
    pub fn new(backend: Arc<dyn EmbeddingBackend>, settings: &EmbeddingSettings) -> Self {
        info!(
            model = backend.model(),
            batch_size = settings.batch_size,
            "embedding client initialized"
        );
        Self {
            backend,
            batch_size: settings.batch_size.max(1),
            cache_max_entries: settings.cache_max_entries,
            cache: Mutex::new(HashMap::new()),
            index: SimilarityIndex::new(),
            counters: Counters::default(),
        }
    }

    /// Stable content fingerprint of a text.
    pub fn fingerprint(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        digest[..16].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Embed a single text. Cache hits return the shared vector with
    /// zero processing time.
    pub async fn embed(&self, text: &str) -> Result<EmbeddingResult> {
        let texts = [text.to_string()];
        let mut results = self.embed_batch(&texts).await?;
        Ok(results.remove(0))
    }

    /// Embed a batch of texts, preserving input order in the output.
    #[instrument(skip(self, texts), fields(operation = "embed_batch", batch_size = texts.len()))]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>> {
        if texts.len() > MAX_EMBED_BATCH {
            return Err(CallsiftError::CapacityExceeded {
                limit: MAX_EMBED_BATCH,
                requested: texts.len(),
            });
        }
        let start = Instant::now();

        let fingerprints: Vec<String> = texts.iter().map(|t| Self::fingerprint(t)).collect();

        // Partition into cached and uncached under one lock acquisition.
        let mut slots: Vec<Option<Arc<Vec<f32>>>> = {
            let cache = self.cache.lock().expect("embedding cache poisoned");
            fingerprints
                .iter()
                .map(|fp| cache.get(fp).map(|entry| Arc::clone(&entry.vector)))
                .collect()
        };
        let cached = slots.iter().filter(|s| s.is_some()).count() as u64;
        if cached > 0 {
            self.counters.cache_hits.fetch_add(cached, Ordering::Relaxed);
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => "embed")
                .increment(cached);
        }

        let uncached: Vec<usize> = (0..texts.len()).filter(|i| slots[*i].is_none()).collect();
        if !uncached.is_empty() {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => "embed")
                .increment(uncached.len() as u64);

            // Dispatch backend-sized chunks concurrently; each chunk
            // carries its input positions so completion order is
            // irrelevant to the final layout.
            let chunk_tasks = uncached.chunks(self.batch_size).map(|positions| {
                let chunk: Vec<String> = positions.iter().map(|&i| texts[i].clone()).collect();
                async move {
                    let vectors = self.backend.embed_chunk(&chunk).await?;
                    Ok::<_, CallsiftError>((positions, vectors))
                }
            });
            for outcome in join_all(chunk_tasks).await {
                let (positions, vectors) = outcome?;
                for (&position, mut vector) in positions.iter().zip(vectors) {
                    l2_normalize(&mut vector);
                    let vector = Arc::new(vector);
                    self.cache_vector(&fingerprints[position], Arc::clone(&vector));
                    slots[position] = Some(vector);
                }
            }

            self.counters
                .embeddings_generated
                .fetch_add(uncached.len() as u64, Ordering::Relaxed);
            self.counters.batch_operations.fetch_add(1, Ordering::Relaxed);
        }

        let elapsed = start.elapsed();
        self.counters
            .total_processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        // Backend time is amortized over the uncached inputs; cached
        // inputs report zero.
        let per_item = if uncached.is_empty() {
            Duration::ZERO
        } else {
            elapsed / uncached.len() as u32
        };

        Ok(texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let was_cached = !uncached.contains(&i);
                EmbeddingResult {
                    text: text.clone(),
                    vector: slots[i].take().expect("every slot filled"),
                    model: self.backend.model().to_string(),
                    fingerprint: fingerprints[i].clone(),
                    processing_time: if was_cached { Duration::ZERO } else { per_item },
                }
            })
            .collect())
    }

    /// Embed texts and append them to the similarity index. Returns the
    /// number of indexed entries.
    pub async fn add_to_index(
        &self,
        texts: Vec<String>,
        metadata: Option<Vec<Map<String, Value>>>,
    ) -> Result<usize> {
        let results = self.embed_batch(&texts).await?;
        let vectors: Vec<Arc<Vec<f32>>> = results.iter().map(|r| Arc::clone(&r.vector)).collect();
        let metadata = metadata.unwrap_or_else(|| vec![Map::new(); texts.len()]);
        if metadata.len() != texts.len() {
            return Err(CallsiftError::InvalidInput(format!(
                "{} metadata entries for {} texts",
                metadata.len(),
                texts.len()
            )));
        }
        self.index.add(vectors, texts, metadata);
        let total = self.index.len();
        info!(total, "texts added to similarity index");
        Ok(total)
    }

    /// Search the similarity index for texts close to the query.
    pub async fn search_similar(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>> {
        if self.index.is_empty() {
            warn!("similarity index is empty");
            return Ok(Vec::new());
        }
        let query_embedding = self.embed(query).await?;
        Ok(self.index.search(&query_embedding.vector, k, threshold))
    }

    /// Bulk-index a corpus in larger-than-normal chunks, tolerating
    /// per-chunk failures. The recovery path after a restart, and the
    /// ingestion path for historical data.
    pub async fn index_corpus(
        &self,
        texts: Vec<String>,
        metadata: Option<Vec<Map<String, Value>>>,
    ) -> CorpusIndexReport {
        let start = Instant::now();
        let chunk_size = (self.batch_size * 4).min(MAX_EMBED_BATCH);
        let total = texts.len();
        let mut indexed = 0;
        let mut errors = 0;

        let mut metadata = metadata.unwrap_or_else(|| vec![Map::new(); total]);
        if metadata.len() != total {
            metadata.resize(total, Map::new());
        }

        let mut texts = texts;
        while !texts.is_empty() {
            let take = chunk_size.min(texts.len());
            let chunk: Vec<String> = texts.drain(..take).collect();
            let chunk_meta: Vec<Map<String, Value>> = metadata.drain(..take).collect();
            match self.add_to_index(chunk, Some(chunk_meta)).await {
                Ok(_) => indexed += take,
                Err(e) => {
                    warn!(error = %e, "corpus chunk failed, continuing");
                    errors += take;
                }
            }
            if indexed > 0 && indexed % 1000 == 0 {
                info!(indexed, total, "corpus indexing progress");
            }
        }

        CorpusIndexReport {
            total,
            indexed,
            errors,
            processing_time: start.elapsed(),
        }
    }

    /// Access the similarity index (shared with the pipeline coordinator).
    pub fn similarity_index(&self) -> &SimilarityIndex {
        &self.index
    }

    /// Whether the embedding backend is reachable.
    pub async fn health_check(&self) -> bool {
        self.backend.health_check().await
    }

    /// Snapshot of the embedding counters.
    pub fn stats(&self) -> EmbeddingStats {
        let generated = self.counters.embeddings_generated.load(Ordering::Relaxed);
        let hits = self.counters.cache_hits.load(Ordering::Relaxed);
        let served = generated + hits;
        EmbeddingStats {
            embeddings_generated: generated,
            cache_hits: hits,
            batch_operations: self.counters.batch_operations.load(Ordering::Relaxed),
            cache_size: self.cache.lock().expect("embedding cache poisoned").len(),
            indexed_texts: self.index.len(),
            total_processing_time: Duration::from_micros(
                self.counters.total_processing_micros.load(Ordering::Relaxed),
            ),
            cache_hit_rate: if served > 0 {
                hits as f64 / served as f64
            } else {
                0.0
            },
        }
    }

    /// Drop all cached vectors (the index is unaffected).
    pub fn clear_cache(&self) {
        self.cache.lock().expect("embedding cache poisoned").clear();
        info!("embedding cache cleared");
    }

    /// Insert a vector, evicting the oldest entry at capacity.
    fn cache_vector(&self, fingerprint: &str, vector: Arc<Vec<f32>>) {
        let mut cache = self.cache.lock().expect("embedding cache poisoned");
        if !cache.contains_key(fingerprint) && cache.len() >= self.cache_max_entries {
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            fingerprint.to_string(),
            CachedVector {
                vector,
                inserted_at: Instant::now(),
            },
        );
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors stay zero.
fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}
