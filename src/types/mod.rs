//! Core data types.

pub mod call;
pub mod inference;
pub mod search;
pub mod summary;

pub use call::{
    AnalysisStage, CallRecord, CustomerContext, EmbeddingStage, HealthStatus, ProcessingOptions,
    ProcessingResult, ProductStage, StageResults, StorageStage,
};
pub use inference::{GenerateOutcome, InferenceRequest, InferenceResponse};
pub use search::{IndexHit, MergedHit, SearchFilters, SearchReport, SearchSource, StoreHit};
pub use summary::{CallSummary, SummaryMetadata, SummaryOutcome};
