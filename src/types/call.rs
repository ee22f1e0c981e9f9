//! Call records and pipeline processing results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::summary::CallSummary;

/// A call transcription record, in the camelCase wire shape shared with
/// the upstream transcription service and the vector store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_id: Option<String>,
    pub transcription_text: String,
    /// Transcription language hint ("he" by default upstream).
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub products_mentioned: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

fn default_language() -> String {
    "he".to_string()
}

/// Tenant scoping for processing and search.
#[derive(Debug, Clone, Default)]
pub struct CustomerContext {
    /// When present, searches are scoped to this tenant; when absent they
    /// span all tenants.
    pub customer_id: Option<String>,
}

impl CustomerContext {
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: Some(customer_id.into()),
        }
    }
}

/// Per-invocation pipeline options.
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    /// Include the in-process similarity index in searches.
    pub include_similar: bool,
    pub limit: Option<usize>,
    pub certainty: Option<f64>,
    pub filters: Option<crate::types::search::SearchFilters>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            include_similar: true,
            limit: None,
            certainty: None,
            filters: None,
        }
    }
}

/// Embedding stage output recorded on a processing result.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingStage {
    pub dimension: usize,
    pub fingerprint: String,
    pub model: String,
    pub processing_time: Duration,
}

/// LLM analysis stage output.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStage {
    pub summary: CallSummary,
    pub backend: String,
    /// True when the deterministic fallback summary was used.
    pub fallback_used: bool,
}

/// Vector-storage stage output.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStage {
    pub stored: bool,
}

/// Product/entity analysis stage output.
#[derive(Debug, Clone, Serialize)]
pub struct ProductStage {
    pub products_detected: Vec<String>,
    pub phone_numbers_found: usize,
}

/// Named sub-results of one pipeline run. A `None` stage either was
/// disabled or failed (the failure is in `ProcessingResult::errors`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageResults {
    pub embedding: Option<EmbeddingStage>,
    pub llm_analysis: Option<AnalysisStage>,
    pub vector_storage: Option<StorageStage>,
    pub product_analysis: Option<ProductStage>,
}

impl StageResults {
    /// Number of stages that produced a result.
    pub fn produced(&self) -> usize {
        [
            self.embedding.is_some(),
            self.llm_analysis.is_some(),
            self.vector_storage.is_some(),
            self.product_analysis.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

/// Aggregated outcome of processing one call through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub call_id: String,
    pub processing_time: Duration,
    pub results: StageResults,
    /// Per-stage errors, in the order they occurred.
    pub errors: Vec<String>,
}

impl ProcessingResult {
    /// Evaluate the partial-success rule: a call succeeds when no stage
    /// failed, or when produced results outnumber failures.
    pub fn evaluate(
        call_id: String,
        processing_time: Duration,
        results: StageResults,
        errors: Vec<String>,
    ) -> Self {
        let success = errors.is_empty() || results.produced() > errors.len();
        Self {
            success,
            call_id,
            processing_time,
            results,
            errors,
        }
    }

    /// A result for a call that failed before any stage could run.
    pub fn failed(call_id: String, error: String) -> Self {
        Self {
            success: false,
            call_id,
            processing_time: Duration::ZERO,
            results: StageResults::default(),
            errors: vec![error],
        }
    }
}

/// Component or pipeline health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Aggregate component statuses: healthy only if all are, degraded if
    /// some are, unhealthy if none are.
    pub fn aggregate(components: &[bool]) -> Self {
        let healthy = components.iter().filter(|c| **c).count();
        if healthy == components.len() && !components.is_empty() {
            HealthStatus::Healthy
        } else if healthy > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}
