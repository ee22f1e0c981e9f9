//! LLM inference request/response types.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::lang::Language;

/// A single LLM generation request.
///
/// Immutable once constructed; every field that shapes the backend call
/// participates in [`cache_key`](Self::cache_key), including the free-form
/// `context_flags` — identical prompts can legitimately deserve different
/// answers once auxiliary server-side configuration changes, so flags such
/// as `"classification-data-loaded"` must be part of the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub temperature: f32,
    /// Completion budget in output units. Backends may budget more raw
    /// tokens internally (Hebrew inflation) without changing this value.
    pub max_tokens: u32,
    /// Backend-specific context flags that shape the response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_flags: Vec<String>,
}

impl InferenceRequest {
    /// Create a request with the given prompt and crate defaults.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: 0.3,
            max_tokens: 300,
            context_flags: Vec::new(),
        }
    }

    /// Set the system prompt.
    pub fn system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion budget.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Add a context flag that shapes the response server-side.
    pub fn context_flag(mut self, flag: impl Into<String>) -> Self {
        self.context_flags.push(flag.into());
        self
    }

    /// Language of the prompt, derived by Hebrew-script scan.
    pub fn language(&self) -> Language {
        Language::of(&self.prompt)
    }

    /// Cache key over every request-shaping input plus the resolved model.
    ///
    /// Temperature is hashed by bit pattern; the f32 comes straight from
    /// config or the caller, so equal requests hash equally.
    pub fn cache_key(&self, model: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.prompt.hash(&mut hasher);
        self.system_prompt.hash(&mut hasher);
        model.hash(&mut hasher);
        self.temperature.to_bits().hash(&mut hasher);
        self.max_tokens.hash(&mut hasher);
        for flag in &self.context_flags {
            flag.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// A successful LLM generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub content: String,
    /// Backend model that produced the content.
    pub model: String,
    pub tokens_used: u32,
    /// Wall-clock time of the backend call. Zero for cache hits.
    pub processing_time: Duration,
    pub timestamp: SystemTime,
    /// Backend-specific extras (eval durations, request ids, …).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl InferenceResponse {
    /// Copy of this response as served from cache: independent clone,
    /// timestamp refreshed to retrieval time, processing time zeroed.
    pub fn as_cache_hit(&self) -> Self {
        Self {
            processing_time: Duration::ZERO,
            timestamp: SystemTime::now(),
            ..self.clone()
        }
    }
}

/// Outcome of an orchestrated generation: either a response plus which
/// backend served it, or the ordered list of per-attempt errors.
#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    Completed {
        response: InferenceResponse,
        /// Backend name that served the request ("local", "remote", "cache").
        backend: String,
        /// True when the primary failed and the fallback served the request.
        via_fallback: bool,
    },
    Failed {
        errors: Vec<String>,
        processing_time: Duration,
    },
}

impl GenerateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerateOutcome::Completed { .. })
    }

    pub fn response(&self) -> Option<&InferenceResponse> {
        match self {
            GenerateOutcome::Completed { response, .. } => Some(response),
            GenerateOutcome::Failed { .. } => None,
        }
    }

    pub fn backend(&self) -> Option<&str> {
        match self {
            GenerateOutcome::Completed { backend, .. } => Some(backend),
            GenerateOutcome::Failed { .. } => None,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            GenerateOutcome::Completed { .. } => &[],
            GenerateOutcome::Failed { errors, .. } => errors,
        }
    }
}
