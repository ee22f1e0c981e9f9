//! Capability traits for backend adapters.
//!
//! Adapters implement narrow capability traits rather than one "god
//! trait", so the orchestrator can hold `Arc<dyn LlmProvider>` handles
//! and tests can inject doubles that fail, stall, or answer out of order.

use async_trait::async_trait;

use crate::Result;
use crate::types::{InferenceRequest, InferenceResponse};

/// A text-generation backend (local inference server or hosted endpoint).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Backend name for logging, metrics and stats ("local", "remote").
    fn name(&self) -> &str;

    /// Generate a completion for the request using the given model.
    ///
    /// Fails with `BackendUnavailable` on connection-level problems and
    /// `BackendError` when the backend answered with a non-2xx status or
    /// an unusable payload.
    async fn generate(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<InferenceResponse>;

    /// Whether the backend is reachable and able to serve the model.
    async fn health_check(&self) -> bool;
}

/// A text-embedding backend: black-box text → vector, batched.
///
/// Returned vectors are raw (not normalized); the embedding client owns
/// normalization and caching.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Backend name for logging and stats.
    fn name(&self) -> &str;

    /// Model identifier reported on results.
    fn model(&self) -> &str;

    /// Embed a chunk of texts, one vector per input, in input order.
    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Whether the backend is reachable. Defaults to healthy for
    /// backends with no probe surface (e.g. in-process test doubles).
    async fn health_check(&self) -> bool {
        true
    }
}
