//! Embedding client tests: ordering, normalization, caching and the
//! similarity index, driven through an injected backend double.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Map;

use callsift::config::EmbeddingSettings;
use callsift::providers::EmbeddingBackend;
use callsift::{CallsiftError, EmbeddingClient, MAX_EMBED_BATCH, Result};

// ============================================================================
// Backend double
// ============================================================================

/// Deterministic per-text vectors with configurable per-chunk delays, so
/// chunks dispatched concurrently complete out of order.
struct ScriptedBackend {
    /// Delay popped per chunk call, in call order.
    delays: Mutex<Vec<Duration>>,
    chunk_calls: AtomicUsize,
    texts_embedded: Mutex<Vec<String>>,
    fail: bool,
}

impl ScriptedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            delays: Mutex::new(Vec::new()),
            chunk_calls: AtomicUsize::new(0),
            texts_embedded: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            delays: Mutex::new(Vec::new()),
            chunk_calls: AtomicUsize::new(0),
            texts_embedded: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn with_delays(delays: Vec<Duration>) -> Arc<Self> {
        let backend = Self::new();
        *backend.delays.lock().unwrap() = delays;
        backend
    }

    /// Raw (non-unit) vector derived from the text, so assertions can
    /// recompute the expected output per input.
    fn vector_for(text: &str) -> Vec<f32> {
        let len = text.chars().count() as f32;
        vec![len, 1.0, 2.0]
    }
}

#[async_trait]
impl EmbeddingBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test-embed-model"
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(CallsiftError::BackendUnavailable {
                backend: "scripted".to_string(),
                reason: "down".to_string(),
            });
        }
        let call = self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(call).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.texts_embedded
            .lock()
            .unwrap()
            .extend(texts.iter().cloned());
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

fn settings(batch_size: usize, cache_max: usize) -> EmbeddingSettings {
    EmbeddingSettings {
        batch_size,
        cache_max_entries: cache_max,
        ..EmbeddingSettings::default()
    }
}

fn client(backend: Arc<ScriptedBackend>, batch_size: usize) -> EmbeddingClient {
    EmbeddingClient::new(backend, &settings(batch_size, 10_000))
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

// ============================================================================
// Ordering & normalization
// ============================================================================

#[tokio::test]
async fn batch_results_match_input_order_despite_out_of_order_completion() {
    // batch_size 1 → one chunk per text; first chunk is the slowest, so
    // completion order is the reverse of dispatch order.
    let backend = ScriptedBackend::with_delays(vec![
        Duration::from_millis(120),
        Duration::from_millis(40),
        Duration::from_millis(5),
    ]);
    let client = client(Arc::clone(&backend), 1);

    let texts = vec!["aaaa".to_string(), "bb".to_string(), "c".to_string()];
    let results = client.embed_batch(&texts).await.unwrap();

    assert_eq!(results.len(), 3);
    for (result, text) in results.iter().zip(&texts) {
        assert_eq!(&result.text, text);
        // The vector is derived from the text; an order mix-up would
        // pair the wrong vector with the wrong text.
        let mut expected = ScriptedBackend::vector_for(text);
        let n = norm(&expected);
        for x in &mut expected {
            *x /= n;
        }
        for (got, want) in result.vector.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }
}

#[tokio::test]
async fn every_vector_is_unit_normalized() {
    let backend = ScriptedBackend::new();
    let client = client(backend, 32);

    let results = client
        .embed_batch(&["short".to_string(), "a much longer text".to_string()])
        .await
        .unwrap();

    for result in results {
        assert!((norm(&result.vector) - 1.0).abs() < 1e-5);
    }
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn cache_hit_shares_the_vector_and_reports_zero_time() {
    let backend = ScriptedBackend::new();
    let client = client(Arc::clone(&backend), 32);

    let first = client.embed("same text").await.unwrap();
    let second = client.embed("same text").await.unwrap();

    assert_eq!(backend.chunk_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.processing_time, Duration::ZERO);
    assert!(first.processing_time > Duration::ZERO);
    assert!(
        Arc::ptr_eq(&first.vector, &second.vector),
        "cached text must serve the same vector allocation"
    );
    assert_eq!(first.fingerprint, second.fingerprint);
}

#[tokio::test]
async fn batch_embeds_only_the_uncached_texts() {
    let backend = ScriptedBackend::new();
    let client = client(Arc::clone(&backend), 32);

    client.embed("alpha").await.unwrap();
    client
        .embed_batch(&["alpha".to_string(), "beta".to_string()])
        .await
        .unwrap();

    let embedded = backend.texts_embedded.lock().unwrap().clone();
    assert_eq!(embedded, vec!["alpha".to_string(), "beta".to_string()]);
}

#[tokio::test]
async fn cache_evicts_oldest_at_capacity() {
    let backend = ScriptedBackend::new();
    let client = EmbeddingClient::new(backend.clone(), &settings(32, 2));

    client.embed("one").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    client.embed("two").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    client.embed("three").await.unwrap(); // evicts "one"

    let calls_before = backend.chunk_calls.load(Ordering::SeqCst);
    client.embed("two").await.unwrap(); // still cached
    assert_eq!(backend.chunk_calls.load(Ordering::SeqCst), calls_before);

    client.embed("one").await.unwrap(); // was evicted, re-embeds
    assert_eq!(backend.chunk_calls.load(Ordering::SeqCst), calls_before + 1);
}

#[tokio::test]
async fn stats_track_cache_hits_and_generation() {
    let backend = ScriptedBackend::new();
    let client = client(backend, 32);

    client.embed("text").await.unwrap();
    client.embed("text").await.unwrap();

    let stats = client.stats();
    assert_eq!(stats.embeddings_generated, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_size, 1);
    assert!((stats.cache_hit_rate - 0.5).abs() < 1e-9);
}

// ============================================================================
// Capacity & failures
// ============================================================================

#[tokio::test]
async fn oversized_batch_is_rejected_before_processing() {
    let backend = ScriptedBackend::new();
    let client = client(Arc::clone(&backend), 32);

    let texts: Vec<String> = (0..MAX_EMBED_BATCH + 1).map(|i| format!("t{i}")).collect();
    let err = client.embed_batch(&texts).await.unwrap_err();

    assert!(matches!(
        err,
        CallsiftError::CapacityExceeded {
            limit: MAX_EMBED_BATCH,
            ..
        }
    ));
    assert_eq!(backend.chunk_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn backend_failure_propagates() {
    let backend = ScriptedBackend::failing();
    let client = client(backend, 32);

    let err = client.embed("text").await.unwrap_err();
    assert!(err.is_unavailable());
}

// ============================================================================
// Similarity index
// ============================================================================

#[tokio::test]
async fn indexed_texts_are_found_by_similarity() {
    let backend = ScriptedBackend::new();
    let client = client(backend, 32);

    let mut metadata = Map::new();
    metadata.insert("callId".into(), "call-1".into());
    client
        .add_to_index(
            vec!["aaaa".to_string(), "a longer different text".to_string()],
            Some(vec![metadata, Map::new()]),
        )
        .await
        .unwrap();

    // Same text → identical vector → score 1.0, ranked first.
    let hits = client.search_similar("aaaa", 10, 0.5).await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].text, "aaaa");
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert_eq!(hits[0].metadata["callId"], "call-1");
}

#[tokio::test]
async fn empty_index_returns_no_hits() {
    let backend = ScriptedBackend::new();
    let client = client(Arc::clone(&backend), 32);

    let hits = client.search_similar("anything", 10, 0.5).await.unwrap();
    assert!(hits.is_empty());
    // The query is not even embedded when there is nothing to search.
    assert_eq!(backend.chunk_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn corpus_indexing_tolerates_partial_failure() {
    let backend = ScriptedBackend::new();
    let client = client(backend, 32);

    let texts: Vec<String> = (0..10).map(|i| format!("call {i}")).collect();
    let report = client.index_corpus(texts, None).await;

    assert_eq!(report.total, 10);
    assert_eq!(report.indexed, 10);
    assert_eq!(report.errors, 0);
    assert_eq!(client.stats().indexed_texts, 10);
}
