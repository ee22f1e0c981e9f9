//! In-process similarity index.
//!
//! A brute-force inner-product index over unit-normalized vectors
//! (inner product == cosine similarity). Append-only for the process
//! lifetime: entries keep their insertion-order position, which callers
//! use as a stable handle. The durable home of the data is the vector
//! store; this index is rebuilt via corpus indexing after a restart.

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::types::IndexHit;

#[derive(Default)]
struct Entries {
    vectors: Vec<Arc<Vec<f32>>>,
    texts: Vec<String>,
    metadata: Vec<Map<String, Value>>,
}

/// Append-only vector index shared across concurrent requests.
#[derive(Default)]
pub struct SimilarityIndex {
    entries: Mutex<Entries>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries. `vectors`, `texts` and `metadata` are aligned by
    /// position; alignment with earlier insertions is preserved.
    pub fn add(
        &self,
        vectors: Vec<Arc<Vec<f32>>>,
        texts: Vec<String>,
        metadata: Vec<Map<String, Value>>,
    ) {
        debug_assert_eq!(vectors.len(), texts.len());
        debug_assert_eq!(vectors.len(), metadata.len());
        let mut entries = self.entries.lock().expect("similarity index poisoned");
        entries.vectors.extend(vectors);
        entries.texts.extend(texts);
        entries.metadata.extend(metadata);
    }

    /// Top-k entries by inner-product similarity with score ≥ threshold,
    /// descending by score.
    pub fn search(&self, query: &[f32], k: usize, threshold: f32) -> Vec<IndexHit> {
        let entries = self.entries.lock().expect("similarity index poisoned");
        let mut hits: Vec<IndexHit> = entries
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| IndexHit {
                text: entries.texts[i].clone(),
                score: dot(query, vector),
                metadata: entries.metadata[i].clone(),
                index: i,
            })
            .filter(|hit| hit.score >= threshold)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("similarity index poisoned")
            .vectors
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
