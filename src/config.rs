//! Configuration loading.
//!
//! Configuration is a single TOML file with one section per subsystem.
//! Every field has a serde default so a partial (or empty) file is valid;
//! the remote backend's API token is the only secret and is resolved from
//! the `REMOTE_LLM_TOKEN` environment variable when not set inline.
//!
//! ```toml
//! [llm]
//! local_base_url = "http://ollama:11434"
//! hebrew_model = "dictalm2.0-instruct:Q4_K_M"
//!
//! [cache]
//! max_entries = 1000
//! ttl_secs = 3600
//!
//! [vector]
//! base_url = "http://weaviate:8080"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::{CallsiftError, Result};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub vector: VectorSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// LLM backend configuration (local inference server + optional remote endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Local inference server base URL.
    #[serde(default = "default_local_url")]
    pub local_base_url: String,
    /// Default model for non-Hebrew prompts.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Hebrew-tuned model, selected when the prompt contains Hebrew script.
    #[serde(default = "default_hebrew_model")]
    pub hebrew_model: String,
    /// Route Hebrew prompts to the Hebrew-tuned model.
    #[serde(default = "default_true")]
    pub hebrew_routing: bool,
    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Default completion budget in output units (pre Hebrew inflation).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Base timeout for the local backend, in seconds. Scaled by the
    /// prompt's complexity tier before use.
    #[serde(default = "default_local_timeout")]
    pub local_timeout_secs: u64,
    /// Fixed timeout for the remote fallback backend, in seconds.
    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,
    /// Simultaneous in-flight requests allowed per backend.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Remote endpoint URL. None disables the fallback backend.
    #[serde(default)]
    pub remote_endpoint: Option<String>,
    /// Remote model identifier (reported in responses).
    #[serde(default = "default_remote_model")]
    pub remote_model: String,
    /// Remote API token. Falls back to the `REMOTE_LLM_TOKEN` env var.
    #[serde(default)]
    pub remote_token: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            local_base_url: default_local_url(),
            default_model: default_model(),
            hebrew_model: default_hebrew_model(),
            hebrew_routing: true,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            local_timeout_secs: default_local_timeout(),
            remote_timeout_secs: default_remote_timeout(),
            max_concurrent: default_max_concurrent(),
            remote_endpoint: None,
            remote_model: default_remote_model(),
            remote_token: None,
        }
    }
}

impl LlmConfig {
    /// Remote API token: inline config first, then `REMOTE_LLM_TOKEN`.
    pub fn resolve_remote_token(&self) -> Option<String> {
        self.remote_token
            .clone()
            .or_else(|| std::env::var("REMOTE_LLM_TOKEN").ok())
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_secs(self.local_timeout_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

fn default_local_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "dictalm2.0-instruct:Q4_K_M".to_string()
}

fn default_hebrew_model() -> String {
    "dictalm2.0-instruct:Q4_K_M".to_string()
}

fn default_remote_model() -> String {
    "meta-llama/Llama-3.1-70B-Instruct".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    300
}

fn default_local_timeout() -> u64 {
    15
}

fn default_remote_timeout() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// Inference cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of cached responses (default: 1000).
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
    /// Time-to-live in seconds (default: 3600).
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_cache_entries(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_cache_entries() -> usize {
    1000
}

fn default_cache_ttl() -> u64 {
    3600
}

/// Embedding backend and client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    /// Embedding inference endpoint base URL.
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Expected vector dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Backend-imposed batch size; larger inputs are chunked.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum cached vectors (oldest evicted first).
    #[serde(default = "default_embedding_cache")]
    pub cache_max_entries: usize,
    /// Request timeout in seconds.
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            cache_max_entries: default_embedding_cache(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_embedding_model() -> String {
    "imvladikon/sentence-transformers-alephbert".to_string()
}

fn default_dimension() -> usize {
    768
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_cache() -> usize {
    10_000
}

fn default_embedding_timeout() -> u64 {
    60
}

/// Vector store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorSettings {
    #[serde(default = "default_vector_url")]
    pub base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            base_url: default_vector_url(),
            timeout_secs: default_vector_timeout(),
        }
    }
}

impl VectorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_vector_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_vector_timeout() -> u64 {
    30
}

/// Pipeline stage toggles and batch concurrency.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_true")]
    pub enable_embeddings: bool,
    #[serde(default = "default_true")]
    pub enable_llm: bool,
    #[serde(default = "default_true")]
    pub enable_vector_storage: bool,
    /// Simultaneous `process_call` invocations within a batch.
    #[serde(default = "default_pipeline_batch")]
    pub batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enable_embeddings: true,
            enable_llm: true,
            enable_vector_storage: true,
            batch_size: default_pipeline_batch(),
        }
    }
}

fn default_pipeline_batch() -> usize {
    10
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CallsiftError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CallsiftError::Configuration(format!("failed to parse config: {e}")))
    }
}
