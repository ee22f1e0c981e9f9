//! Search hit types for the two retrieval paths and their merged form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::call::CallRecord;

/// Additional filters for vector-store semantic search. All filters are
/// conjunctive; unset fields are not constrained.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub language: Option<String>,
    pub call_type: Option<String>,
    /// Inclusive RFC 3339 lower bound on call date.
    pub date_from: Option<String>,
    /// Inclusive RFC 3339 upper bound on call date.
    pub date_to: Option<String>,
}

/// A semantic-search hit from the vector store.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHit {
    #[serde(flatten)]
    pub record: CallRecord,
    /// Backend-reported certainty in [0, 1].
    pub certainty: f64,
    pub distance: f64,
}

/// A hit from the in-process similarity index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexHit {
    pub text: String,
    /// Inner-product similarity (== cosine, vectors are unit-normalized).
    pub score: f32,
    pub metadata: Map<String, Value>,
    /// Insertion-order position in the index.
    pub index: usize,
}

/// Which retrieval path produced a merged hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    /// Vector-store semantic search.
    Vector,
    /// In-process similarity index.
    Local,
}

/// A deduplicated, ranked hit combining both retrieval paths.
#[derive(Debug, Clone, Serialize)]
pub struct MergedHit {
    /// Call id when known, otherwise a text-prefix key.
    pub key: String,
    pub search_source: SearchSource,
    pub rank_score: f64,
    /// Full record for vector-store hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CallRecord>,
    /// Indexed text for similarity-index hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Result envelope for `intelligent_search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub results: Vec<MergedHit>,
    pub total_found: usize,
    pub processing_time: std::time::Duration,
}
