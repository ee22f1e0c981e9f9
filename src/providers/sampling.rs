//! Script-aware sampling parameters.
//!
//! Hebrew script tokenizes 3–5× less efficiently than Latin script on the
//! models we host, so a caller asking for N output units needs a larger
//! raw-token budget — and benefits from different sampling settings — when
//! the prompt is Hebrew. The adjustment happens here, once, for both LLM
//! adapters; callers keep reasoning in output units.

use crate::lang;

/// Raw-token inflation factor applied to Hebrew prompts.
const HEBREW_TOKEN_FACTOR: u32 = 5;

/// Upper bound on the inflated budget, matching the hosted models' limits.
const MAX_RAW_TOKENS: u32 = 2048;

/// Resolved sampling parameters for one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    /// Raw-token completion budget (after any Hebrew inflation).
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    pub stop_sequences: Vec<String>,
}

impl SamplingParams {
    /// Compute parameters for a prompt, inflating the token budget and
    /// loosening sampling when Hebrew script is present.
    pub fn for_prompt(prompt: &str, temperature: f32, max_tokens: u32) -> Self {
        if lang::contains_hebrew(prompt) {
            Self {
                // Floor, not override: a caller asking for 0.9 keeps 0.9.
                temperature: temperature.max(0.8),
                max_tokens: (max_tokens.saturating_mul(HEBREW_TOKEN_FACTOR)).min(MAX_RAW_TOKENS),
                top_p: 0.95,
                top_k: 100,
                repetition_penalty: 1.1,
                // Minimal stop set: Hebrew answers are short and the extra
                // end-of-text marker truncates them mid-sentence.
                stop_sequences: vec!["<|eot_id|>".to_string()],
            }
        } else {
            Self {
                temperature,
                max_tokens,
                top_p: 0.9,
                top_k: 50,
                repetition_penalty: 1.2,
                stop_sequences: vec!["<|eot_id|>".to_string(), "<|end_of_text|>".to_string()],
            }
        }
    }
}
