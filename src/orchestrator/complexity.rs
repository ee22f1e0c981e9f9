//! Prompt complexity scoring for adaptive timeouts.
//!
//! A fixed timeout either kills legitimate long analytical generations or
//! wastes wall-clock waiting on trivial ones. Prompts are classified into
//! four tiers by keyword heuristics (with a text-length fallback when no
//! keyword matches) and the per-backend base timeout is scaled by the
//! tier's multiplier.

use std::time::Duration;

/// Complexity tier of a prompt, ordered cheapest to most expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Complexity {
    /// Greetings and acknowledgements.
    Trivial,
    /// Simple count/lookup questions.
    Simple,
    /// List/display requests.
    Listing,
    /// Analysis, summarization, comparison.
    Analytical,
}

/// Greeting and acknowledgement markers (tier 1).
const GREETING_KEYWORDS: &[&str] = &["hello", "hi ", "hey", "thanks", "thank you", "שלום", "תודה", "היי"];

/// Simple count-query markers (tier 2).
const COUNT_KEYWORDS: &[&str] = &["how many", "count", "number of", "כמה", "מספר"];

/// List/display request markers (tier 3).
const LIST_KEYWORDS: &[&str] = &["list", "show", "display", "הצג", "רשימה", "פרט"];

/// Analytical/summarization markers (tier 4).
const ANALYTICAL_KEYWORDS: &[&str] = &[
    "analyze", "analyse", "summarize", "summarise", "summary", "explain", "compare", "why",
    "נתח", "סכם", "סיכום", "הסבר", "השווה", "מדוע", "למה",
];

impl Complexity {
    /// Classify a prompt. Higher tiers win when keywords from several
    /// tiers appear.
    pub fn of(prompt: &str) -> Self {
        let lowered = prompt.to_lowercase();
        if contains_any(&lowered, ANALYTICAL_KEYWORDS) {
            return Complexity::Analytical;
        }
        if contains_any(&lowered, LIST_KEYWORDS) {
            return Complexity::Listing;
        }
        if contains_any(&lowered, COUNT_KEYWORDS) {
            return Complexity::Simple;
        }
        if contains_any(&lowered, GREETING_KEYWORDS) {
            return Complexity::Trivial;
        }
        // No keyword matched: fall back to length.
        match prompt.chars().count() {
            0..=40 => Complexity::Trivial,
            41..=120 => Complexity::Simple,
            121..=400 => Complexity::Listing,
            _ => Complexity::Analytical,
        }
    }

    /// Timeout multiplier applied to the backend's base timeout.
    pub fn timeout_multiplier(self) -> f64 {
        match self {
            Complexity::Trivial => 1.0,
            Complexity::Simple => 1.5,
            Complexity::Listing => 2.0,
            Complexity::Analytical => 2.5,
        }
    }
}

/// Base timeout scaled by the prompt's complexity tier.
pub fn adaptive_timeout(base: Duration, prompt: &str) -> Duration {
    base.mul_f64(Complexity::of(prompt).timeout_multiplier())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
