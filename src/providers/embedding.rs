//! HTTP embedding backend.
//!
//! Wraps a feature-extraction inference endpoint (the embedding model
//! runtime itself is a black box behind `POST /embed`). Returns raw,
//! un-normalized vectors; normalization and caching belong to the
//! embedding client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use super::traits::EmbeddingBackend;
use crate::config::EmbeddingSettings;
use crate::{CallsiftError, Result};

const BACKEND_NAME: &str = "embedding";

/// Client for the embedding inference endpoint.
pub struct HttpEmbeddingBackend {
    base_url: String,
    model: String,
    /// Expected vector dimension; mismatching responses are rejected.
    dimension: usize,
    http: Client,
}

impl HttpEmbeddingBackend {
    /// Create a client from the embedding settings.
    pub fn new(settings: &EmbeddingSettings) -> Self {
        Self::with_base_url(
            settings.base_url.clone(),
            settings.model.clone(),
            settings.dimension,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Create a client with an explicit base URL (for wiremock tests).
    pub fn with_base_url(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        let backend = Self {
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            http,
        };
        info!(base_url = %backend.base_url, model = %backend.model, "embedding backend initialized");
        backend
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embed", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EmbedRequest {
                inputs: texts,
                model: &self.model,
            })
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

        // One vector per input: [[f32; dim]; n]
        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| CallsiftError::from_transport(BACKEND_NAME, e))?;

        if vectors.len() != texts.len() {
            return Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: status.as_u16(),
                message: format!(
                    "backend returned {} vectors for {} inputs",
                    vectors.len(),
                    texts.len()
                ),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(CallsiftError::BackendError {
                backend: BACKEND_NAME.to_string(),
                status: status.as_u16(),
                message: format!(
                    "backend returned a {}-dimensional vector, expected {}",
                    bad.len(),
                    self.dimension
                ),
            });
        }
        Ok(vectors)
    }

    async fn health_check(&self) -> bool {
        match self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "embedding backend health check failed");
                false
            }
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    model: &'a str,
}
