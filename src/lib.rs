//! Callsift - call-analytics ML backend orchestration
//!
//! This crate is the serving core of a call-analytics backend: it routes
//! customer-service transcriptions through embedding generation, local or
//! hosted LLM summarization, and vector-search indexing, and merges the
//! results of the two search paths. The HTTP layer above it and the model
//! runtimes below it are external collaborators.
//!
//! # Processing example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callsift::{
//!     CallRecord, Config, CustomerContext, EmbeddingClient, InferenceCache,
//!     InferenceCacheConfig, Orchestrator, OrchestratorConfig, Pipeline,
//!     VectorStoreClient,
//! };
//! use callsift::providers::{HttpEmbeddingBackend, LocalLlmClient, LocalLlmConfig};
//!
//! #[tokio::main]
//! async fn main() -> callsift::Result<()> {
//!     let config = Config::default();
//!
//!     let local = Arc::new(LocalLlmClient::new(LocalLlmConfig::from_settings(&config.llm)));
//!     let cache = Arc::new(InferenceCache::new(InferenceCacheConfig::new()));
//!     let orchestrator = Arc::new(Orchestrator::new(
//!         OrchestratorConfig::from_settings(&config.llm),
//!         local,
//!         None,
//!         Some(cache),
//!     ));
//!     let embedding = Arc::new(EmbeddingClient::new(
//!         Arc::new(HttpEmbeddingBackend::new(&config.embedding)),
//!         &config.embedding,
//!     ));
//!     let store = Arc::new(VectorStoreClient::new(&config.vector));
//!     let pipeline = Arc::new(Pipeline::new(config.pipeline, embedding, orchestrator, store));
//!
//!     let record = CallRecord {
//!         call_id: "call-1".into(),
//!         transcription_text: "שלום, יש לי בעיה עם האינטרנט".into(),
//!         ..CallRecord::default()
//!     };
//!     let result = pipeline
//!         .process_call(&record, &CustomerContext::for_customer("cust-1"), None)
//!         .await;
//!     println!("success: {}", result.success);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod lang;
pub mod orchestrator;
pub mod pipeline;
pub mod providers;
pub mod telemetry;
pub mod types;
pub mod vector;

// Re-export main types at crate root
pub use cache::{CacheStats, InferenceCache, InferenceCacheConfig};
pub use config::Config;
pub use embedding::{
    CorpusIndexReport, EmbeddingClient, EmbeddingResult, EmbeddingStats, MAX_EMBED_BATCH,
    SimilarityIndex,
};
pub use error::{CallsiftError, Result};
pub use lang::Language;
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorHealth, OrchestratorStats, Route, SummarizeItem,
};
pub use pipeline::{MAX_PROCESS_BATCH, Pipeline, PipelineHealth, PipelineStats};
pub use vector::{BatchInsertReport, StoreStats, VectorStoreClient};

// Re-export all types
pub use types::{
    CallRecord, CallSummary, CustomerContext, GenerateOutcome, HealthStatus, IndexHit,
    InferenceRequest, InferenceResponse, MergedHit, ProcessingOptions, ProcessingResult,
    SearchFilters, SearchReport, SearchSource, StageResults, StoreHit, SummaryMetadata,
    SummaryOutcome,
};
