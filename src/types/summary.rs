//! Structured call summaries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Structured analysis of a call transcription, as requested from the LLM.
///
/// Every field except `summary` is optional-with-default: models routinely
/// omit fields, and a partially filled summary is still useful downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub products_mentioned: Vec<String>,
    #[serde(default)]
    pub main_issue: Option<String>,
    #[serde(default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub customer_satisfaction: Option<String>,
    #[serde(default)]
    pub issue_resolved: Option<bool>,
}

impl CallSummary {
    /// Deterministic fallback summary when every backend failed: the first
    /// 200 characters of the transcription (plus ellipsis when truncated),
    /// flagged for manual review.
    pub fn fallback(transcription: &str) -> Self {
        let truncated: String = transcription.chars().take(200).collect();
        let summary = if transcription.chars().count() > 200 {
            format!("{truncated}...")
        } else {
            truncated
        };
        Self {
            summary,
            key_points: vec!["Call transcription available".to_string()],
            sentiment: Some("neutral".to_string()),
            action_items: vec!["Manual review required".to_string()],
            customer_satisfaction: Some("unknown".to_string()),
            issue_resolved: Some(false),
            ..Self::default()
        }
    }
}

/// Metadata about how a summary was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub model: String,
    pub tokens_used: u32,
    pub processing_time: Duration,
}

/// Outcome of `summarize_call`: callers always receive *some* summary
/// object — a parsed one from a backend, or the deterministic fallback
/// with the errors that forced it.
#[derive(Debug, Clone)]
pub enum SummaryOutcome {
    Parsed {
        summary: CallSummary,
        /// Backend that produced the summary ("local", "remote", "cache").
        backend: String,
        metadata: SummaryMetadata,
    },
    Fallback {
        summary: CallSummary,
        errors: Vec<String>,
        processing_time: Duration,
    },
}

impl SummaryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SummaryOutcome::Parsed { .. })
    }

    pub fn summary(&self) -> &CallSummary {
        match self {
            SummaryOutcome::Parsed { summary, .. } => summary,
            SummaryOutcome::Fallback { summary, .. } => summary,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            SummaryOutcome::Parsed { .. } => &[],
            SummaryOutcome::Fallback { errors, .. } => errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_truncates_long_transcriptions() {
        let long = "a".repeat(300);
        let fallback = CallSummary::fallback(&long);
        assert_eq!(fallback.summary, format!("{}...", "a".repeat(200)));
        assert_eq!(fallback.issue_resolved, Some(false));
    }

    #[test]
    fn fallback_keeps_short_transcriptions_whole() {
        let fallback = CallSummary::fallback("short call");
        assert_eq!(fallback.summary, "short call");
    }

    #[test]
    fn fallback_truncation_is_character_not_byte_based() {
        // Hebrew is multi-byte in UTF-8; a byte slice at 200 could split a
        // codepoint and panic.
        let hebrew = "ש".repeat(250);
        let fallback = CallSummary::fallback(&hebrew);
        assert_eq!(fallback.summary.chars().count(), 203); // 200 + "..."
    }

    #[test]
    fn summary_parses_with_missing_fields() {
        let parsed: CallSummary =
            serde_json::from_str(r#"{"summary": "billing question"}"#).unwrap();
        assert_eq!(parsed.summary, "billing question");
        assert!(parsed.key_points.is_empty());
        assert!(parsed.sentiment.is_none());
    }
}
