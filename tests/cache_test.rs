//! Inference cache behaviour through the public API.

use std::time::{Duration, SystemTime};

use callsift::{InferenceCache, InferenceCacheConfig, InferenceRequest, InferenceResponse};

fn response(content: &str) -> InferenceResponse {
    InferenceResponse {
        content: content.to_string(),
        model: "test-model".to_string(),
        tokens_used: 11,
        processing_time: Duration::from_millis(800),
        timestamp: SystemTime::now(),
        metadata: serde_json::Map::new(),
    }
}

#[test]
fn identical_requests_share_one_entry() {
    let cache = InferenceCache::new(InferenceCacheConfig::new());
    let a = InferenceRequest::new("summarize this")
        .system_prompt("you are an analyst")
        .temperature(0.3)
        .max_tokens(800);
    let b = InferenceRequest::new("summarize this")
        .system_prompt("you are an analyst")
        .temperature(0.3)
        .max_tokens(800);

    cache.set(a.cache_key("m"), response("the answer"));
    let hit = cache.get(b.cache_key("m")).expect("identical request hits");
    assert_eq!(hit.content, "the answer");
    assert_eq!(hit.processing_time, Duration::ZERO);
}

#[test]
fn any_request_shaping_input_changes_the_key() {
    let base = InferenceRequest::new("prompt")
        .system_prompt("system")
        .temperature(0.3)
        .max_tokens(100);

    let variants = [
        InferenceRequest::new("other prompt")
            .system_prompt("system")
            .temperature(0.3)
            .max_tokens(100),
        InferenceRequest::new("prompt")
            .system_prompt("other system")
            .temperature(0.3)
            .max_tokens(100),
        InferenceRequest::new("prompt")
            .system_prompt("system")
            .temperature(0.7)
            .max_tokens(100),
        InferenceRequest::new("prompt")
            .system_prompt("system")
            .temperature(0.3)
            .max_tokens(200),
        // The context-flag case: same prompt, different server-side
        // configuration, must not share an entry.
        InferenceRequest::new("prompt")
            .system_prompt("system")
            .temperature(0.3)
            .max_tokens(100)
            .context_flag("classification-data-loaded"),
    ];

    for variant in &variants {
        assert_ne!(base.cache_key("m"), variant.cache_key("m"));
    }
    assert_ne!(base.cache_key("model-a"), base.cache_key("model-b"));
}

#[test]
fn capacity_eviction_leaves_exactly_max_entries_without_the_oldest() {
    let max = 5;
    let cache = InferenceCache::new(InferenceCacheConfig::new().max_entries(max));
    let keys: Vec<u64> = (0..=max as u64).collect();

    for &key in &keys {
        cache.set(key, response(&format!("answer {key}")));
        std::thread::sleep(Duration::from_millis(2));
    }

    assert_eq!(cache.stats().size, max);
    assert!(cache.get(keys[0]).is_none(), "oldest-inserted key is gone");
    for &key in &keys[1..] {
        assert!(cache.get(key).is_some(), "newer key {key} survives");
    }
}

#[test]
fn expired_entries_do_not_serve_stale_answers() {
    let cache =
        InferenceCache::new(InferenceCacheConfig::new().ttl(Duration::from_millis(30)));
    let request = InferenceRequest::new("question");
    let key = request.cache_key("m");

    cache.set(key, response("fresh"));
    assert!(cache.get(key).is_some());

    std::thread::sleep(Duration::from_millis(50));
    assert!(cache.get(key).is_none(), "entry past TTL must miss");
}

#[test]
fn cached_copies_are_independent() {
    let cache = InferenceCache::new(InferenceCacheConfig::new());
    cache.set(7, response("shared"));

    let mut first = cache.get(7).unwrap();
    first.content.push_str(" mutated");

    let second = cache.get(7).unwrap();
    assert_eq!(second.content, "shared");
}
