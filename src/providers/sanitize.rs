//! Shared response sanitization for LLM backends.
//!
//! Degenerate sampling loops show up as the same few words repeated for
//! hundreds of tokens. [`clean_response`] detects excessive 3-gram
//! repetition and truncates at the first repeat boundary. Short outputs
//! are exempt so terse valid Hebrew answers are never mangled.

use tracing::warn;

use crate::lang;

/// Word-count threshold below which the repetition guard does not apply.
const REPETITION_MIN_WORDS: usize = 20;

/// A 3-gram must repeat more than this many times to count as degenerate.
const REPETITION_LIMIT: usize = 5;

/// Control-token artifacts that leak into completions.
const ARTIFACTS: &[&str] = &[
    "<|eot_id|>",
    "<|start_header_id|>",
    "<|end_header_id|>",
    "<|end_of_text|>",
];

/// Sanitize a raw completion: strip artifacts, guard against repetition
/// loops, and log (never mutate) language mismatches.
pub fn clean_response(content: &str, backend: &str, expect_hebrew: bool) -> String {
    let mut content = content.trim().to_string();

    for artifact in ARTIFACTS {
        if content.contains(artifact) {
            content = content.replace(artifact, "");
        }
    }

    let content = truncate_repetition(content.trim(), backend);

    if expect_hebrew && !lang::contains_hebrew(&content) && lang::contains_latin(&content) {
        warn!(backend, "expected Hebrew response but got Latin script");
    }

    content
}

/// Truncate at the first repeated 3-gram when the output is long enough
/// and some 3-gram repeats more than [`REPETITION_LIMIT`] times.
fn truncate_repetition(content: &str, backend: &str) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() <= REPETITION_MIN_WORDS {
        return content.to_string();
    }

    let mut counts: std::collections::HashMap<[&str; 3], usize> = std::collections::HashMap::new();
    for window in words.windows(3) {
        *counts.entry([window[0], window[1], window[2]]).or_default() += 1;
    }
    let max_repetition = counts.values().copied().max().unwrap_or(0);
    if max_repetition <= REPETITION_LIMIT {
        return content.to_string();
    }

    warn!(
        backend,
        max_repetition, "detected repetitive response, truncating at first repeat"
    );

    let mut seen = std::collections::HashSet::new();
    for (i, window) in words.windows(3).enumerate() {
        let phrase = [window[0], window[1], window[2]];
        if !seen.insert(phrase) {
            return words[..i].join(" ");
        }
    }
    content.to_string()
}
