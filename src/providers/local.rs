//! Local inference server adapter.
//!
//! Talks to an Ollama-compatible server over `POST /api/generate`.
//! Model fallback is an explicit iteration over an ordered candidate
//! list: when the server answers 404 for the requested model (not pulled
//! yet, renamed tag), the next candidate is tried with a freshly built
//! payload — no recursion, no duplicated request-building.

use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::sampling::SamplingParams;
use super::sanitize;
use super::traits::LlmProvider;
use crate::config::LlmConfig;
use crate::types::{InferenceRequest, InferenceResponse};
use crate::{CallsiftError, Result};

const BACKEND_NAME: &str = "local";

/// Configuration for the local adapter.
#[derive(Debug, Clone)]
pub struct LocalLlmConfig {
    pub base_url: String,
    /// Model tried when the requested one is missing (404).
    pub fallback_model: Option<String>,
    /// Context window requested per call; sized for long Hebrew
    /// conversations.
    pub num_ctx: u32,
    /// Per-request network timeout. The orchestrator layers its adaptive
    /// timeout on top of this.
    pub timeout: Duration,
    /// Simultaneous in-flight requests allowed against this server.
    pub max_concurrent: usize,
}

impl LocalLlmConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            fallback_model: None,
            num_ctx: 16_384,
            timeout: Duration::from_secs(15),
            max_concurrent: 10,
        }
    }

    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Derive the adapter config from the service-level LLM settings.
    pub fn from_settings(settings: &LlmConfig) -> Self {
        Self::new(settings.local_base_url.clone())
            .fallback_model(settings.default_model.clone())
            .timeout(settings.local_timeout())
            .max_concurrent(settings.max_concurrent)
    }
}

/// Client for the local inference server.
pub struct LocalLlmClient {
    config: LocalLlmConfig,
    http: Client,
    semaphore: Semaphore,
}

impl LocalLlmClient {
    /// Create a new client for the given server.
    pub fn new(config: LocalLlmConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        let semaphore = Semaphore::new(config.max_concurrent.max(1));
        info!(base_url = %config.base_url, "local LLM client initialized");
        Self {
            config,
            http,
            semaphore,
        }
    }

    /// List models available on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        if !response.status().is_success() {
            return Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: response.status().as_u16(),
                message: "failed to list models".to_string(),
            });
        }
        let tags: TagsReply = response
            .json()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Ordered model candidates for a request: the routed model first,
    /// then the configured fallback (if distinct).
    fn candidates(&self, model: &str) -> Vec<String> {
        let mut candidates = vec![model.to_string()];
        if let Some(fallback) = &self.config.fallback_model {
            if fallback != model {
                candidates.push(fallback.clone());
            }
        }
        candidates
    }

    async fn post_generate(
        &self,
        model: &str,
        request: &InferenceRequest,
        params: &SamplingParams,
    ) -> Result<reqwest::Response> {
        let payload = GeneratePayload {
            model,
            prompt: &request.prompt,
            system: request.system_prompt.as_deref(),
            stream: false,
            options: PayloadOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
                num_ctx: self.config.num_ctx,
                repeat_penalty: params.repetition_penalty,
                top_p: params.top_p,
                top_k: params.top_k,
                stop: &params.stop_sequences,
            },
        };
        self.http
            .post(format!("{}/api/generate", self.config.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))
    }
}

#[async_trait]
impl LlmProvider for LocalLlmClient {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn generate(
        &self,
        request: &InferenceRequest,
        model: &str,
    ) -> Result<InferenceResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("local LLM semaphore closed");
        let start = Instant::now();
        let params =
            SamplingParams::for_prompt(&request.prompt, request.temperature, request.max_tokens);
        let expect_hebrew = request.language().is_hebrew();

        let candidates = self.candidates(model);
        let last = candidates.len() - 1;
        for (i, candidate) in candidates.iter().enumerate() {
            let response = self.post_generate(candidate, request, &params).await?;
            let status = response.status();

            if status.as_u16() == 404 && i < last {
                warn!(
                    model = %candidate,
                    next = %candidates[i + 1],
                    "model not found on local server, trying next candidate"
                );
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(CallsiftError::BackendError {
                    backend: BACKEND_NAME.to_string(),
                    status: status.as_u16(),
                    message,
                });
            }

            let reply: GenerateReply = response
                .json()
                .await
                .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
            let content = sanitize::clean_response(&reply.response, BACKEND_NAME, expect_hebrew);
            debug!(model = %candidate, tokens = reply.eval_count, "local generation complete");

            let mut metadata = Map::new();
            metadata.insert("eval_duration".into(), Value::from(reply.eval_duration));
            metadata.insert(
                "prompt_eval_count".into(),
                Value::from(reply.prompt_eval_count),
            );
            metadata.insert("total_duration".into(), Value::from(reply.total_duration));
            metadata.insert("load_duration".into(), Value::from(reply.load_duration));
            if i > 0 {
                metadata.insert("fallback_model_used".into(), Value::from(true));
            }

            return Ok(InferenceResponse {
                content,
                model: candidate.clone(),
                tokens_used: reply.eval_count,
                processing_time: start.elapsed(),
                timestamp: SystemTime::now(),
                metadata,
            });
        }
        unreachable!("candidate list is never empty")
    }

    async fn health_check(&self) -> bool {
        match self.list_models().await {
            Ok(models) => {
                let serving = match &self.config.fallback_model {
                    Some(model) => models.iter().any(|m| m == model),
                    None => !models.is_empty(),
                };
                if !serving {
                    warn!("local server reachable but configured model is not pulled");
                }
                serving
            }
            Err(e) => {
                warn!(error = %e, "local LLM health check failed");
                false
            }
        }
    }
}

#[derive(Serialize)]
struct GeneratePayload<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: PayloadOptions<'a>,
}

#[derive(Serialize)]
struct PayloadOptions<'a> {
    temperature: f32,
    num_predict: u32,
    num_ctx: u32,
    repeat_penalty: f32,
    top_p: f32,
    top_k: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    eval_duration: u64,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    total_duration: u64,
    #[serde(default)]
    load_duration: u64,
}

#[derive(Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}
