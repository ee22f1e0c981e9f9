//! Callsift error types

/// Callsift error types
#[derive(Debug, thiserror::Error)]
pub enum CallsiftError {
    /// Backend could not be reached: connection refused, DNS failure, or
    /// request timeout. Triggers cross-backend fallback where configured.
    #[error("backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// Backend was reachable but returned an error status or a payload
    /// we could not make sense of.
    #[error("backend '{backend}' error ({status}): {message}")]
    BackendError {
        backend: String,
        status: u16,
        message: String,
    },

    /// LLM output could not be coerced to the expected structured shape
    /// after all sanitization attempts. Carries the raw text for diagnostics.
    #[error("failed to parse model output: {reason}")]
    ParseFailure { reason: String, raw: String },

    /// Batch size over the documented cap; rejected before processing begins.
    #[error("batch of {requested} items exceeds the cap of {limit}")]
    CapacityExceeded { limit: usize, requested: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CallsiftError {
    /// Whether this failure means the backend could not be reached at all.
    ///
    /// Unavailability (and only unavailability) is what the orchestrator's
    /// sequential fallback and the vector store's bounded retry act on;
    /// 4xx-style errors are permanent and surfaced immediately.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CallsiftError::BackendUnavailable { .. })
    }

    /// Whether a vector-store write may be retried: connection-level
    /// failures and 5xx statuses, never 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallsiftError::BackendUnavailable { .. } => true,
            CallsiftError::BackendError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a reqwest transport error onto the taxonomy for a named backend.
    pub(crate) fn from_transport(backend: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            CallsiftError::BackendUnavailable {
                backend: backend.to_string(),
                reason: err.to_string(),
            }
        } else {
            CallsiftError::BackendError {
                backend: backend.to_string(),
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }
}

/// Result type alias for callsift operations
pub type Result<T> = std::result::Result<T, CallsiftError>;
