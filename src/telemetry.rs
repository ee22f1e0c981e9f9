//! Telemetry metric name constants.
//!
//! Centralised metric names for callsift operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `callsift_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `backend` — backend name (e.g. "local", "remote", "vector-store")
//! - `operation` — operation invoked (e.g. "generate", "embed", "insert")
//! - `status` — outcome: "ok" or "error"

/// Total LLM generation requests dispatched through the orchestrator.
///
/// Labels: `backend`, `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "callsift_requests_total";

/// Request duration in seconds.
///
/// Labels: `backend`, `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "callsift_request_duration_seconds";

/// Total cross-backend fallback attempts.
///
/// Labels: `operation`.
pub const FALLBACKS_TOTAL: &str = "callsift_fallbacks_total";

/// Total inference/embedding cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "callsift_cache_hits_total";

/// Total inference/embedding cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "callsift_cache_misses_total";

/// Total calls processed by the pipeline coordinator.
///
/// Labels: `status` ("ok" | "partial" | "error").
pub const PIPELINE_CALLS_TOTAL: &str = "callsift_pipeline_calls_total";

/// Total completion tokens reported by LLM backends.
///
/// Labels: `backend`.
pub const TOKENS_TOTAL: &str = "callsift_tokens_total";

/// Total vector-store write retries (not counting the initial attempt).
pub const STORE_RETRIES_TOTAL: &str = "callsift_store_retries_total";
