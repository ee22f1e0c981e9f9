//! Merge and rank results from the two retrieval paths.

use crate::types::{IndexHit, MergedHit, SearchSource, StoreHit};

/// Characters of text used as a dedup key when no call id is available.
const TEXT_KEY_PREFIX: usize = 50;

/// Merge vector-store and similarity-index hits into one ranked list.
///
/// Deduplication is by call id, falling back to a 50-character text
/// prefix. Vector-store hits win collisions; the merged list is sorted
/// by score, descending.
pub fn merge_search_results(
    store_hits: Vec<StoreHit>,
    index_hits: Vec<IndexHit>,
) -> Vec<MergedHit> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::with_capacity(store_hits.len() + index_hits.len());

    for hit in store_hits {
        let key = store_key(&hit);
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        merged.push(MergedHit {
            key,
            search_source: SearchSource::Vector,
            rank_score: hit.certainty,
            record: Some(hit.record),
            text: None,
            metadata: serde_json::Map::new(),
        });
    }

    for hit in index_hits {
        let key = index_key(&hit);
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        merged.push(MergedHit {
            key,
            search_source: SearchSource::Local,
            rank_score: f64::from(hit.score),
            record: None,
            text: Some(hit.text),
            metadata: hit.metadata,
        });
    }

    merged.sort_by(|a, b| {
        b.rank_score
            .partial_cmp(&a.rank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}

fn store_key(hit: &StoreHit) -> String {
    if !hit.record.call_id.is_empty() {
        hit.record.call_id.clone()
    } else {
        text_prefix(&hit.record.transcription_text)
    }
}

fn index_key(hit: &IndexHit) -> String {
    hit.metadata
        .get("callId")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| text_prefix(&hit.text))
}

fn text_prefix(text: &str) -> String {
    text.chars().take(TEXT_KEY_PREFIX).collect()
}
