//! Pipeline coordination: the per-call processing state machine and
//! cross-source search.
//!
//! Per call the pipeline runs
//! `received → {embedding, llm-analysis} → vector-write → entity-analysis`,
//! with the first two stages concurrent (they are independent) and the
//! vector write waiting for both — it stores whatever LLM-derived fields
//! exist, so a failed stage degrades the record instead of losing it.
//! Stage failures are recorded and never halt later stages.

mod merge;

pub use merge::merge_search_results;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::config::PipelineSettings;
use crate::embedding::EmbeddingClient;
use crate::lang::Language;
use crate::orchestrator::{Orchestrator, OrchestratorHealth};
use crate::telemetry;
use crate::types::{
    AnalysisStage, CallRecord, CustomerContext, EmbeddingStage, HealthStatus, ProcessingOptions,
    ProcessingResult, ProductStage, SearchReport, StageResults, StorageStage, SummaryOutcome,
};
use crate::vector::VectorStoreClient;
use crate::{CallsiftError, Result};

/// Batch cap enforced before any processing begins.
pub const MAX_PROCESS_BATCH: usize = 50;

/// Product keywords scanned during entity analysis.
const PRODUCT_KEYWORDS: &[&str] = &[
    "אינטרנט", "טלוויזיה", "טלפון", "חבילה", "מכשיר", "ראוטר",
    "אייפון", "סמסונג", "מחשב", "טאבלט", "אפליקציה",
];

/// Pipeline health report, per component.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineHealth {
    pub status: HealthStatus,
    /// None when the stage is disabled.
    pub embeddings: Option<bool>,
    pub llm: Option<OrchestratorHealth>,
    pub vector_store: Option<bool>,
}

/// Aggregate pipeline counters for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub calls_processed: u64,
    pub embeddings_generated: u64,
    pub summaries_created: u64,
    pub vector_entries_added: u64,
    pub errors: u64,
    pub avg_processing_time: Duration,
    pub success_rate: f64,
}

#[derive(Default)]
struct Counters {
    calls_processed: AtomicU64,
    embeddings_generated: AtomicU64,
    summaries_created: AtomicU64,
    vector_entries_added: AtomicU64,
    errors: AtomicU64,
    total_processing_micros: AtomicU64,
}

/// Coordinates the embedding client, LLM orchestrator and vector store
/// for call processing and search.
pub struct Pipeline {
    embedding: Arc<EmbeddingClient>,
    orchestrator: Arc<Orchestrator>,
    store: Arc<VectorStoreClient>,
    settings: PipelineSettings,
    counters: Counters,
}

impl Pipeline {
    /// Create a pipeline over the given components.
    pub fn new(
        settings: PipelineSettings,
        embedding: Arc<EmbeddingClient>,
        orchestrator: Arc<Orchestrator>,
        store: Arc<VectorStoreClient>,
    ) -> Self {
        info!(
            embeddings = settings.enable_embeddings,
            llm = settings.enable_llm,
            vector_storage = settings.enable_vector_storage,
            "pipeline initialized"
        );
        Self {
            embedding,
            orchestrator,
            store,
            settings,
            counters: Counters::default(),
        }
    }

    /// Process one call through the full pipeline.
    ///
    /// Never returns an error: stage failures are folded into the
    /// returned [`ProcessingResult`].
    #[instrument(skip(self, record, context), fields(operation = "process_call", call_id = %record.call_id))]
    pub async fn process_call(
        &self,
        record: &CallRecord,
        context: &CustomerContext,
        _options: Option<&ProcessingOptions>,
    ) -> ProcessingResult {
        let start = Instant::now();
        let transcription = record.transcription_text.clone();
        let language = Language::from_hint(&record.language);

        let mut stages = StageResults::default();
        let mut errors = Vec::new();

        if !transcription.is_empty() {
            // Embedding and LLM analysis are independent of each other;
            // run them concurrently and join.
            let embed_task = async {
                if self.settings.enable_embeddings {
                    Some(self.embedding.embed(&transcription).await)
                } else {
                    None
                }
            };
            let llm_task = async {
                if self.settings.enable_llm {
                    Some(
                        self.orchestrator
                            .summarize_call(&transcription, language)
                            .await,
                    )
                } else {
                    None
                }
            };
            let (embed_outcome, llm_outcome) = tokio::join!(embed_task, llm_task);

            match embed_outcome {
                Some(Ok(result)) => {
                    self.counters
                        .embeddings_generated
                        .fetch_add(1, Ordering::Relaxed);
                    stages.embedding = Some(EmbeddingStage {
                        dimension: result.vector.len(),
                        fingerprint: result.fingerprint,
                        model: result.model,
                        processing_time: result.processing_time,
                    });
                }
                Some(Err(e)) => {
                    let message = format!("embedding generation failed: {e}");
                    error!(call_id = %record.call_id, "{message}");
                    errors.push(message);
                }
                None => {}
            }

            match llm_outcome {
                Some(SummaryOutcome::Parsed {
                    summary, backend, ..
                }) => {
                    self.counters
                        .summaries_created
                        .fetch_add(1, Ordering::Relaxed);
                    stages.llm_analysis = Some(AnalysisStage {
                        summary,
                        backend,
                        fallback_used: false,
                    });
                }
                Some(SummaryOutcome::Fallback {
                    summary,
                    errors: llm_errors,
                    ..
                }) => {
                    let message = format!("llm analysis failed: {}", llm_errors.join("; "));
                    warn!(call_id = %record.call_id, "{message}");
                    errors.push(message);
                    // The fallback summary still flows downstream so the
                    // vector record carries something.
                    stages.llm_analysis = Some(AnalysisStage {
                        summary,
                        backend: "fallback".to_string(),
                        fallback_used: true,
                    });
                }
                None => {}
            }

            if self.settings.enable_vector_storage {
                let payload = self.storage_payload(record, context, &stages);
                match self.store.insert(&payload).await {
                    Ok(()) => {
                        self.counters
                            .vector_entries_added
                            .fetch_add(1, Ordering::Relaxed);
                        stages.vector_storage = Some(StorageStage { stored: true });
                    }
                    Err(e) => {
                        let message = format!("vector storage failed: {e}");
                        error!(call_id = %record.call_id, "{message}");
                        errors.push(message);
                    }
                }
            }

            stages.product_analysis = Some(analyze_products(&transcription));
        }

        let elapsed = start.elapsed();
        self.counters.calls_processed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if !errors.is_empty() {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }

        let result =
            ProcessingResult::evaluate(record.call_id.clone(), elapsed, stages, errors);
        let status = match (result.success, result.errors.is_empty()) {
            (true, true) => "ok",
            (true, false) => "partial",
            (false, _) => "error",
        };
        metrics::counter!(telemetry::PIPELINE_CALLS_TOTAL, "status" => status).increment(1);
        result
    }

    /// Process a batch of calls with bounded concurrency.
    ///
    /// Each call runs in its own task: a panic or failure in one becomes
    /// a failed [`ProcessingResult`] for that item, and the batch itself
    /// never fails past the capacity check.
    pub async fn process_batch(
        self: &Arc<Self>,
        records: Vec<CallRecord>,
        context: CustomerContext,
        options: Option<ProcessingOptions>,
    ) -> Result<Vec<ProcessingResult>> {
        if records.len() > MAX_PROCESS_BATCH {
            return Err(CallsiftError::CapacityExceeded {
                limit: MAX_PROCESS_BATCH,
                requested: records.len(),
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.batch_size.max(1)));
        let handles: Vec<_> = records
            .into_iter()
            .map(|record| {
                let pipeline = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                let context = context.clone();
                let options = options.clone();
                let call_id = record.call_id.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .expect("batch semaphore closed");
                    pipeline
                        .process_call(&record, &context, options.as_ref())
                        .await
                });
                (call_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (call_id, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(call_id = %call_id, error = %e, "processing task aborted");
                    results.push(ProcessingResult::failed(
                        call_id,
                        format!("processing task aborted: {e}"),
                    ));
                }
            }
        }
        Ok(results)
    }

    /// Cross-source search: vector-store semantic search and the
    /// in-process similarity index, run concurrently, merged and ranked.
    #[instrument(skip(self, query, context, options), fields(operation = "intelligent_search"))]
    pub async fn intelligent_search(
        &self,
        query: &str,
        context: &CustomerContext,
        options: Option<&ProcessingOptions>,
    ) -> SearchReport {
        let start = Instant::now();
        let defaults = ProcessingOptions::default();
        let options = options.unwrap_or(&defaults);
        let limit = options.limit.unwrap_or(10);
        let certainty = options.certainty.unwrap_or(0.7);

        let store_task = async {
            if !self.settings.enable_vector_storage {
                return Vec::new();
            }
            match self
                .store
                .semantic_search(
                    query,
                    context.customer_id.as_deref(),
                    limit,
                    certainty,
                    options.filters.as_ref(),
                )
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "vector search failed, continuing with index only");
                    Vec::new()
                }
            }
        };
        let index_task = async {
            if !(options.include_similar && self.settings.enable_embeddings) {
                return Vec::new();
            }
            match self.embedding.search_similar(query, limit, 0.5).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "similarity index search failed, continuing without it");
                    Vec::new()
                }
            }
        };
        let (store_hits, index_hits) = tokio::join!(store_task, index_task);

        let results = merge_search_results(store_hits, index_hits);
        SearchReport {
            total_found: results.len(),
            results,
            processing_time: start.elapsed(),
        }
    }

    /// Check every enabled component. Healthy only if all enabled
    /// components are; degraded if some are; unhealthy if none are.
    pub async fn health_check(&self) -> PipelineHealth {
        let embeddings = if self.settings.enable_embeddings {
            Some(self.embedding.health_check().await)
        } else {
            None
        };
        let llm = if self.settings.enable_llm {
            Some(self.orchestrator.health_check().await)
        } else {
            None
        };
        let vector_store = if self.settings.enable_vector_storage {
            Some(self.store.health_check().await)
        } else {
            None
        };

        let mut components = Vec::new();
        if let Some(ok) = embeddings {
            components.push(ok);
        }
        if let Some(health) = &llm {
            components.push(health.status == HealthStatus::Healthy);
        }
        if let Some(ok) = vector_store {
            components.push(ok);
        }

        PipelineHealth {
            status: HealthStatus::aggregate(&components),
            embeddings,
            llm,
            vector_store,
        }
    }

    /// The embedding client (shared with the HTTP layer for the direct
    /// embedding endpoints).
    pub fn embedding(&self) -> &Arc<EmbeddingClient> {
        &self.embedding
    }

    /// The LLM orchestrator.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// The vector store client.
    pub fn store(&self) -> &Arc<VectorStoreClient> {
        &self.store
    }

    /// Snapshot of the pipeline counters.
    pub fn stats(&self) -> PipelineStats {
        let calls = self.counters.calls_processed.load(Ordering::Relaxed);
        let errors = self.counters.errors.load(Ordering::Relaxed);
        PipelineStats {
            calls_processed: calls,
            embeddings_generated: self.counters.embeddings_generated.load(Ordering::Relaxed),
            summaries_created: self.counters.summaries_created.load(Ordering::Relaxed),
            vector_entries_added: self.counters.vector_entries_added.load(Ordering::Relaxed),
            errors,
            avg_processing_time: if calls > 0 {
                Duration::from_micros(
                    self.counters.total_processing_micros.load(Ordering::Relaxed) / calls,
                )
            } else {
                Duration::ZERO
            },
            success_rate: if calls > 0 {
                (calls - errors) as f64 / calls as f64
            } else {
                0.0
            },
        }
    }

    /// Assemble the write payload from whatever stage outputs exist.
    /// Missing LLM fields stay empty.
    fn storage_payload(
        &self,
        record: &CallRecord,
        context: &CustomerContext,
        stages: &StageResults,
    ) -> CallRecord {
        let mut payload = record.clone();
        if payload.customer_id.is_none() {
            payload.customer_id = context.customer_id.clone();
        }
        if let Some(analysis) = &stages.llm_analysis {
            payload.sentiment = analysis.summary.sentiment.clone();
            payload.products_mentioned = analysis.summary.products_mentioned.clone();
            payload.key_points = analysis.summary.key_points.clone();
        }
        payload
    }
}

/// Keyword-based product and entity extraction over the raw transcript.
fn analyze_products(transcription: &str) -> ProductStage {
    let mut products_detected = Vec::new();
    for keyword in PRODUCT_KEYWORDS {
        if transcription.contains(keyword) && !products_detected.contains(&keyword.to_string()) {
            products_detected.push(keyword.to_string());
        }
    }
    let phone_numbers_found = transcription
        .split_whitespace()
        .filter(|token| {
            let digits = token.chars().filter(char::is_ascii_digit).count();
            digits >= 9 && token.chars().all(|c| c.is_ascii_digit() || c == '-')
        })
        .count();
    ProductStage {
        products_detected,
        phone_numbers_found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_keywords_are_detected() {
        let stage = analyze_products("יש לי בעיה עם האינטרנט והראוטר בבית");
        assert!(stage.products_detected.contains(&"אינטרנט".to_string()));
        assert!(stage.products_detected.contains(&"ראוטר".to_string()));
    }

    #[test]
    fn phone_numbers_are_counted() {
        let stage = analyze_products("תתקשרו אליי ל 052-1234567 או 0521234567");
        assert_eq!(stage.phone_numbers_found, 2);
    }

    #[test]
    fn clean_text_detects_nothing() {
        let stage = analyze_products("סתם שיחה כללית");
        assert!(stage.products_detected.is_empty());
        assert_eq!(stage.phone_numbers_found, 0);
    }
}
