//! LLM orchestration: routing, adaptive timeouts, failover, stats.
//!
//! The orchestrator owns the decision of *which* backend and model serve
//! a request and *how long* they get. Routing is language-aware (Hebrew
//! prompts go to the Hebrew-tuned model when enabled); the primary
//! backend runs under a complexity-scaled timeout; on any primary
//! failure the fallback backend, when configured and enabled, is tried
//! once with its own fixed timeout. Fallback is sequential, never
//! concurrent with the primary.
//!
//! Successful generations go through the inference cache; failures never
//! do. All per-attempt errors are accumulated in order so a total failure
//! reports the full story.

pub mod complexity;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::cache::InferenceCache;
use crate::config::LlmConfig;
use crate::lang::{self, Language};
use crate::providers::LlmProvider;
use crate::providers::extract;
use crate::telemetry;
use crate::types::{
    CallSummary, GenerateOutcome, HealthStatus, InferenceRequest, InferenceResponse,
    SummaryMetadata, SummaryOutcome,
};

/// Latency threshold separating the fast/slow response buckets.
const FAST_RESPONSE: Duration = Duration::from_secs(5);

/// Orchestrator-level configuration (model routing + timeouts).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_model: String,
    pub hebrew_model: String,
    /// Route Hebrew prompts to the Hebrew-tuned model.
    pub hebrew_routing: bool,
    /// Base timeout for the primary backend, scaled by prompt complexity.
    pub primary_base_timeout: Duration,
    /// Fixed timeout for the single fallback attempt.
    pub fallback_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl OrchestratorConfig {
    /// Derive the orchestrator config from the service-level LLM settings.
    pub fn from_settings(settings: &LlmConfig) -> Self {
        Self {
            default_model: settings.default_model.clone(),
            hebrew_model: settings.hebrew_model.clone(),
            hebrew_routing: settings.hebrew_routing,
            primary_base_timeout: settings.local_timeout(),
            fallback_timeout: settings.remote_timeout(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Routing decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub model: String,
    pub hebrew: bool,
}

/// One item of a batch summarization request.
#[derive(Debug, Clone)]
pub struct SummarizeItem {
    pub text: String,
    pub language: Language,
}

/// Orchestrator health report.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorHealth {
    pub primary_healthy: bool,
    /// None when no fallback backend is configured.
    pub fallback_healthy: Option<bool>,
    pub status: HealthStatus,
}

/// Process-lifetime orchestrator counters.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub primary_requests: u64,
    pub fallback_requests: u64,
    pub fallback_triggers: u64,
    pub total_errors: u64,
    /// Responses under 5 s.
    pub fast_responses: u64,
    /// Responses at or over 5 s.
    pub slow_responses: u64,
    pub total_requests: u64,
}

#[derive(Default)]
struct Counters {
    primary_requests: AtomicU64,
    fallback_requests: AtomicU64,
    fallback_triggers: AtomicU64,
    total_errors: AtomicU64,
    fast_responses: AtomicU64,
    slow_responses: AtomicU64,
}

/// Routes generation requests across the configured backends.
pub struct Orchestrator {
    primary: Arc<dyn LlmProvider>,
    fallback: Option<Arc<dyn LlmProvider>>,
    cache: Option<Arc<InferenceCache>>,
    config: OrchestratorConfig,
    fallback_enabled: AtomicBool,
    counters: Counters,
}

impl Orchestrator {
    /// Create an orchestrator over the given backends.
    pub fn new(
        config: OrchestratorConfig,
        primary: Arc<dyn LlmProvider>,
        fallback: Option<Arc<dyn LlmProvider>>,
        cache: Option<Arc<InferenceCache>>,
    ) -> Self {
        Self {
            primary,
            fallback,
            cache,
            config,
            fallback_enabled: AtomicBool::new(true),
            counters: Counters::default(),
        }
    }

    /// Enable or disable the fallback backend at runtime.
    pub fn set_fallback_enabled(&self, enabled: bool) {
        self.fallback_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Build a request with the configured default sampling. The entry
    /// point for plain generation calls that carry no explicit options.
    pub fn request(&self, prompt: impl Into<String>) -> InferenceRequest {
        InferenceRequest::new(prompt)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
    }

    /// Select the model for a prompt: Hebrew script routes to the
    /// Hebrew-tuned model when Hebrew routing is on.
    pub fn route(&self, prompt: &str) -> Route {
        let hebrew = lang::contains_hebrew(prompt);
        let model = if hebrew && self.config.hebrew_routing {
            self.config.hebrew_model.clone()
        } else {
            self.config.default_model.clone()
        };
        Route { model, hebrew }
    }

    /// Generate a completion with routing, caching, adaptive timeout and
    /// sequential fallback. Never returns an `Err`: expected failures are
    /// folded into [`GenerateOutcome::Failed`].
    #[instrument(skip(self, request), fields(operation = "generate"))]
    pub async fn generate(&self, request: &InferenceRequest) -> GenerateOutcome {
        let start = Instant::now();
        let route = self.route(&request.prompt);
        let key = request.cache_key(&route.model);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(key) {
                debug!(model = %route.model, "inference cache hit");
                return GenerateOutcome::Completed {
                    response: hit,
                    backend: "cache".to_string(),
                    via_fallback: false,
                };
            }
        }

        let mut errors = Vec::new();

        let timeout = complexity::adaptive_timeout(self.config.primary_base_timeout, &request.prompt);
        match self.attempt(self.primary.as_ref(), request, &route.model, timeout).await {
            Ok(response) => {
                self.counters.primary_requests.fetch_add(1, Ordering::Relaxed);
                self.bucket_latency(start.elapsed());
                self.store(key, &response);
                return GenerateOutcome::Completed {
                    backend: self.primary.name().to_string(),
                    response,
                    via_fallback: false,
                };
            }
            Err(message) => errors.push(message),
        }

        if self.fallback_enabled.load(Ordering::Relaxed) {
            if let Some(fallback) = &self.fallback {
                self.counters.fallback_triggers.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::FALLBACKS_TOTAL, "operation" => "generate")
                    .increment(1);
                warn!(
                    primary = self.primary.name(),
                    fallback = fallback.name(),
                    "primary backend failed, trying fallback"
                );
                match self
                    .attempt(fallback.as_ref(), request, &route.model, self.config.fallback_timeout)
                    .await
                {
                    Ok(response) => {
                        self.counters.fallback_requests.fetch_add(1, Ordering::Relaxed);
                        self.bucket_latency(start.elapsed());
                        self.store(key, &response);
                        return GenerateOutcome::Completed {
                            backend: fallback.name().to_string(),
                            response,
                            via_fallback: true,
                        };
                    }
                    Err(message) => errors.push(message),
                }
            }
        }

        self.counters.total_errors.fetch_add(1, Ordering::Relaxed);
        GenerateOutcome::Failed {
            errors,
            processing_time: start.elapsed(),
        }
    }

    /// Summarize a call transcription into a structured summary.
    ///
    /// Callers always receive a summary object: a parsed one from a
    /// backend, or — when every backend or the parse failed — the
    /// deterministic truncated-transcript fallback.
    #[instrument(skip(self, transcription), fields(operation = "summarize_call"))]
    pub async fn summarize_call(&self, transcription: &str, language: Language) -> SummaryOutcome {
        let start = Instant::now();
        let (system, prompt) = summary_prompts(transcription, language);
        let request = InferenceRequest::new(prompt)
            .system_prompt(system)
            .temperature(0.3)
            .max_tokens(800);

        match self.generate(&request).await {
            GenerateOutcome::Completed {
                response, backend, ..
            } => match extract::extract_summary(&response.content) {
                Ok(summary) => SummaryOutcome::Parsed {
                    summary,
                    backend,
                    metadata: SummaryMetadata {
                        model: response.model,
                        tokens_used: response.tokens_used,
                        processing_time: response.processing_time,
                    },
                },
                Err(e) => {
                    warn!(backend, error = %e, "summary parse failed, using fallback summary");
                    SummaryOutcome::Fallback {
                        summary: CallSummary::fallback(transcription),
                        errors: vec![e.to_string()],
                        processing_time: start.elapsed(),
                    }
                }
            },
            GenerateOutcome::Failed { errors, .. } => SummaryOutcome::Fallback {
                summary: CallSummary::fallback(transcription),
                errors,
                processing_time: start.elapsed(),
            },
        }
    }

    /// Summarize a batch of transcriptions with bounded concurrency.
    ///
    /// Per-item failures surface as fallback outcomes in the returned
    /// vec (input order); one bad item never aborts the batch.
    pub async fn batch_summarize(
        &self,
        items: &[SummarizeItem],
        max_concurrent: usize,
    ) -> Vec<SummaryOutcome> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let tasks = items.iter().map(|item| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("batch summarize semaphore closed");
                self.summarize_call(&item.text, item.language).await
            }
        });
        futures_util::future::join_all(tasks).await
    }

    /// Check both backends. Healthy overall when any backend is.
    pub async fn health_check(&self) -> OrchestratorHealth {
        let primary_healthy = self.primary.health_check().await;
        let fallback_healthy = match &self.fallback {
            Some(fallback) => Some(fallback.health_check().await),
            None => None,
        };
        let status = if primary_healthy || fallback_healthy == Some(true) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        OrchestratorHealth {
            primary_healthy,
            fallback_healthy,
            status,
        }
    }

    /// Snapshot of the process-lifetime counters.
    pub fn stats(&self) -> OrchestratorStats {
        let primary = self.counters.primary_requests.load(Ordering::Relaxed);
        let fallback = self.counters.fallback_requests.load(Ordering::Relaxed);
        OrchestratorStats {
            primary_requests: primary,
            fallback_requests: fallback,
            fallback_triggers: self.counters.fallback_triggers.load(Ordering::Relaxed),
            total_errors: self.counters.total_errors.load(Ordering::Relaxed),
            fast_responses: self.counters.fast_responses.load(Ordering::Relaxed),
            slow_responses: self.counters.slow_responses.load(Ordering::Relaxed),
            total_requests: primary + fallback,
        }
    }

    /// One timed attempt against one backend. Timeouts abandon the
    /// in-flight call (best effort, no remote-side cancellation) and
    /// read as unavailability.
    async fn attempt(
        &self,
        provider: &dyn LlmProvider,
        request: &InferenceRequest,
        model: &str,
        timeout: Duration,
    ) -> std::result::Result<InferenceResponse, String> {
        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, provider.generate(request, model)).await;
        let elapsed = start.elapsed().as_secs_f64();
        let (status, result) = match outcome {
            Ok(Ok(response)) => {
                metrics::counter!(telemetry::TOKENS_TOTAL,
                    "backend" => provider.name().to_owned(),
                )
                .increment(u64::from(response.tokens_used));
                ("ok", Ok(response))
            }
            Ok(Err(e)) => {
                warn!(backend = provider.name(), error = %e, "generation attempt failed");
                ("error", Err(format!("{}: {e}", provider.name())))
            }
            Err(_) => {
                warn!(
                    backend = provider.name(),
                    timeout_secs = timeout.as_secs_f64(),
                    "generation attempt timed out"
                );
                (
                    "error",
                    Err(format!(
                        "{}: request timed out after {:.1}s",
                        provider.name(),
                        timeout.as_secs_f64()
                    )),
                )
            }
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "backend" => provider.name().to_owned(),
            "operation" => "generate",
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "backend" => provider.name().to_owned(),
            "operation" => "generate",
        )
        .record(elapsed);
        result
    }

    fn bucket_latency(&self, elapsed: Duration) {
        if elapsed < FAST_RESPONSE {
            self.counters.fast_responses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.slow_responses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn store(&self, key: u64, response: &InferenceResponse) {
        if let Some(cache) = &self.cache {
            cache.set(key, response.clone());
        }
    }
}

/// Language-specific system/user prompt pair for call summarization.
///
/// Prompt scaffolding stays in English for both languages (the models
/// follow English instructions more reliably); for Hebrew calls the
/// instructions demand Hebrew values in the JSON.
fn summary_prompts(transcription: &str, language: Language) -> (String, String) {
    if language.is_hebrew() {
        (
            "Analyze customer service calls. Analyze Hebrew calls and respond \
             with Hebrew values in JSON format only."
                .to_string(),
            format!(
                r#"Customer call transcription (Hebrew): {transcription}

Analyze this call and provide a structured summary.
Respond with JSON only, with Hebrew values:
{{
    "summary": "Brief summary in Hebrew",
    "key_points": ["point 1 in Hebrew", "point 2 in Hebrew"],
    "sentiment": "positive/negative/neutral",
    "products_mentioned": ["product names if any"],
    "main_issue": "main issue or need in Hebrew",
    "call_type": "inquiry/complaint/request/info"
}}"#
            ),
        )
    } else {
        (
            "Analyze customer service calls. Summarize calls and extract \
             important information. Always respond in structured JSON format only."
                .to_string(),
            format!(
                r#"Analyze the following customer service call transcription and provide a structured summary:

Call transcription:
{transcription}

Please provide the analysis in the following JSON format:
{{
    "summary": "Brief summary of the call",
    "key_points": ["Important point 1", "Important point 2"],
    "sentiment": "positive/negative/neutral",
    "products_mentioned": ["Product 1", "Product 2"],
    "action_items": ["Required action 1", "Required action 2"],
    "customer_satisfaction": "high/medium/low",
    "issue_resolved": true
}}

Ensure the response is valid JSON only."#
            ),
        )
    }
}
