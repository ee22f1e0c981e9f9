//! Extraction of structured summaries from LLM output.
//!
//! Models are instructed to answer with JSON only, and mostly comply.
//! The known failure modes: prose around the object, markdown code
//! fences, and (for Hebrew output) unescaped gershayim-style quotation
//! marks inside abbreviations such as ח"כ, plus dropped commas between
//! adjacent fields. The ladder here tries progressively more invasive
//! recoveries and surfaces a typed [`ParseFailure`] with the raw text
//! attached when all of them fail.
//!
//! [`ParseFailure`]: crate::CallsiftError::ParseFailure

use crate::lang;
use crate::types::CallSummary;
use crate::{CallsiftError, Result};

/// Parse a raw completion into a [`CallSummary`].
pub fn extract_summary(raw: &str) -> Result<CallSummary> {
    let stripped = strip_code_fences(raw.trim());

    if let Ok(summary) = serde_json::from_str::<CallSummary>(stripped) {
        return Ok(summary);
    }

    if let Some(span) = brace_span(stripped) {
        if let Ok(summary) = serde_json::from_str::<CallSummary>(span) {
            return Ok(summary);
        }
        if lang::contains_hebrew(span) {
            let repaired = insert_missing_commas(&escape_hebrew_quotes(span));
            if let Ok(summary) = serde_json::from_str::<CallSummary>(&repaired) {
                return Ok(summary);
            }
        }
    }

    Err(CallsiftError::ParseFailure {
        reason: "no parseable JSON object in model output".to_string(),
        raw: raw.to_string(),
    })
}

/// Strip a surrounding markdown code fence (```json … ```), if any.
fn strip_code_fences(content: &str) -> &str {
    let content = content.trim();
    let without_open = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .unwrap_or(content);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// The span from the first `{` to the last `}`, when both exist.
/// Greedy, so nested objects stay inside the span.
fn brace_span(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Escape a quotation mark sandwiched between two Hebrew letters.
///
/// That pattern is a Hebrew abbreviation marker (gershayim typed as an
/// ASCII quote), never a JSON string delimiter — delimiters always have
/// punctuation or whitespace on at least one side.
fn escape_hebrew_quotes(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());
    for (i, &c) in chars.iter().enumerate() {
        let hebrew_neighbours = i > 0
            && i + 1 < chars.len()
            && lang::is_hebrew_char(chars[i - 1])
            && lang::is_hebrew_char(chars[i + 1]);
        if c == '"' && hebrew_neighbours {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Insert a comma between two fields separated only by a newline.
///
/// Matches `"` + whitespace-run-containing-a-newline + `"`, which is the
/// shape the model produces when it drops a field separator. Whitespace
/// without a newline is left alone — it appears inside legitimate string
/// values.
fn insert_missing_commas(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());
    let mut i = 0;
    while i < chars.len() {
        out.push(chars[i]);
        if chars[i] == '"' {
            let mut j = i + 1;
            let mut saw_newline = false;
            while j < chars.len() && chars[j].is_whitespace() {
                saw_newline |= chars[j] == '\n';
                j += 1;
            }
            if saw_newline && j < chars.len() && chars[j] == '"' {
                out.push(',');
            }
        }
        i += 1;
    }
    out
}
