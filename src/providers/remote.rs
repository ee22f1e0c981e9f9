//! Hosted text-generation endpoint adapter.
//!
//! Talks to a managed inference endpoint serving an instruction-tuned
//! chat model behind a bare text-generation API. The adapter owns the
//! chat-template formatting (the endpoint takes a flat string), a
//! bounded-concurrency semaphore, and the network timeout — a timeout is
//! reported as `BackendUnavailable` so the orchestrator's fallback logic
//! treats it like an unreachable backend.

use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::sampling::SamplingParams;
use super::sanitize;
use super::traits::LlmProvider;
use crate::config::LlmConfig;
use crate::lang;
use crate::types::{InferenceRequest, InferenceResponse};
use crate::{CallsiftError, Result};

const BACKEND_NAME: &str = "remote";

/// Configuration for the remote adapter.
#[derive(Debug, Clone)]
pub struct RemoteLlmConfig {
    /// Full endpoint URL (the endpoint serves exactly one model).
    pub endpoint_url: String,
    /// Model identifier reported in responses.
    pub model_name: String,
    pub api_token: String,
    pub timeout: Duration,
    /// Simultaneous in-flight requests allowed against the endpoint.
    pub max_concurrent: usize,
}

impl RemoteLlmConfig {
    pub fn new(
        endpoint_url: impl Into<String>,
        model_name: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            model_name: model_name.into(),
            api_token: api_token.into(),
            timeout: Duration::from_secs(10),
            max_concurrent: 10,
        }
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
    /// Returns `None` when no remote endpoint (or token) is configured.
    pub fn from_settings(settings: &LlmConfig) -> Option<Self> {
        let endpoint = settings.remote_endpoint.clone()?;
        let token = settings.resolve_remote_token()?;
        Some(
            Self::new(endpoint, settings.remote_model.clone(), token)
                .timeout(settings.remote_timeout())
                .max_concurrent(settings.max_concurrent),
        )
    }
}

/// Client for the hosted inference endpoint.
pub struct RemoteLlmClient {
    config: RemoteLlmConfig,
    http: Client,
    semaphore: Semaphore,
}

impl RemoteLlmClient {
    /// Create a new client for the configured endpoint.
    pub fn new(config: RemoteLlmConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        let semaphore = Semaphore::new(config.max_concurrent.max(1));
        info!(endpoint = %config.endpoint_url, model = %config.model_name, "remote LLM client initialized");
        Self {
            config,
            http,
            semaphore,
        }
    }

    /// Format prompt and system prompt into the model's chat template.
    ///
    /// Hebrew prompts get an explicit respond-in-Hebrew directive: the
    /// model is multilingual and drifts into English without it.
    fn format_chat_prompt(prompt: &str, system_prompt: Option<&str>) -> String {
        let hebrew = lang::contains_hebrew(prompt);
        match (system_prompt, hebrew) {
            (Some(system), true) => format!(
                "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n{system}\n\nIMPORTANT: Respond in Hebrew only.<|eot_id|><|start_header_id|>user<|end_header_id|>\n{prompt}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n"
            ),
            (Some(system), false) => format!(
                "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n{system}<|eot_id|><|start_header_id|>user<|end_header_id|>\n{prompt}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n"
            ),
            (None, true) => format!(
                "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n{prompt}\n\nRespond in Hebrew.<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n"
            ),
            (None, false) => format!(
                "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n{prompt}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n"
            ),
        }
    }
}

#[async_trait]
impl LlmProvider for RemoteLlmClient {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn generate(
        &self,
        request: &InferenceRequest,
        _model: &str,
    ) -> Result<InferenceResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("remote LLM semaphore closed");
        let start = Instant::now();

        let formatted = Self::format_chat_prompt(&request.prompt, request.system_prompt.as_deref());
        let params = SamplingParams::for_prompt(&formatted, request.temperature, request.max_tokens);
        let expect_hebrew = request.language().is_hebrew();

        let payload = EndpointPayload {
            inputs: &formatted,
            parameters: EndpointParameters {
                max_new_tokens: params.max_tokens,
                temperature: params.temperature,
                do_sample: params.temperature > 0.0,
                top_p: params.top_p,
                top_k: params.top_k,
                repetition_penalty: params.repetition_penalty,
                return_full_text: false,
                stop: &params.stop_sequences,
            },
        };

        let response = self
            .http
            .post(&self.config.endpoint_url)
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        // The endpoint returns [{generated_text}] for single inputs; some
        // deployments unwrap the array.
        let body: Value = response
            .json()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;
        let generated = body
            .get(0)
            .and_then(|v| v.get("generated_text"))
            .or_else(|| body.get("generated_text"))
            .and_then(Value::as_str)
            .ok_or_else(|| CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: status.as_u16(),
                message: format!("unexpected response shape: {body}"),
            })?;

        let content = sanitize::clean_response(generated, BACKEND_NAME, expect_hebrew);
        debug!(chars = content.len(), "remote generation complete");

        let mut metadata = Map::new();
        metadata.insert("endpoint_url".into(), Value::from(self.config.endpoint_url.clone()));
        if let Some(id) = request_id {
            metadata.insert("request_id".into(), Value::from(id));
        }

        // The endpoint reports no token counts; approximate by words.
        let tokens_used = content.split_whitespace().count() as u32;

        Ok(InferenceResponse {
            content,
            model: self.config.model_name.clone(),
            tokens_used,
            processing_time: start.elapsed(),
            timestamp: SystemTime::now(),
            metadata,
        })
    }

    async fn health_check(&self) -> bool {
        // Cheapest possible generation: one token, near-zero temperature.
        let payload = EndpointPayload {
            inputs: "Hello",
            parameters: EndpointParameters {
                max_new_tokens: 1,
                temperature: 0.1,
                do_sample: false,
                top_p: 0.9,
                top_k: 50,
                repetition_penalty: 1.0,
                return_full_text: false,
                stop: &[],
            },
        };
        match self
            .http
            .post(&self.config.endpoint_url)
            .bearer_auth(&self.config.api_token)
            .json(&payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "remote LLM health check failed");
                false
            }
        }
    }
}

#[derive(Serialize)]
struct EndpointPayload<'a> {
    inputs: &'a str,
    parameters: EndpointParameters<'a>,
}

#[derive(Serialize)]
struct EndpointParameters<'a> {
    max_new_tokens: u32,
    temperature: f32,
    do_sample: bool,
    top_p: f32,
    top_k: u32,
    repetition_penalty: f32,
    return_full_text: bool,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hebrew_prompt_gets_hebrew_directive() {
        let formatted = RemoteLlmClient::format_chat_prompt("מה שלומך", Some("Analyze calls."));
        assert!(formatted.contains("Respond in Hebrew only."));
        assert!(formatted.starts_with("<|begin_of_text|>"));
        assert!(formatted.ends_with("<|start_header_id|>assistant<|end_header_id|>\n"));
    }

    #[test]
    fn english_prompt_has_no_directive() {
        let formatted = RemoteLlmClient::format_chat_prompt("how are you", Some("Analyze calls."));
        assert!(!formatted.contains("Respond in Hebrew"));
        assert!(formatted.contains("Analyze calls."));
    }

    #[test]
    fn bare_prompt_without_system() {
        let formatted = RemoteLlmClient::format_chat_prompt("how are you", None);
        assert!(!formatted.contains("system<|end_header_id|>"));
        assert!(formatted.contains("user<|end_header_id|>\nhow are you"));
    }
}
