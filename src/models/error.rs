//! Error types for concord.
//!
//! Per-sample failures never surface here: a failed generation or program run
//! becomes a `"bug"` sample and the run continues. These errors abort a run.

use thiserror::Error;

/// Top-level error type for concord.
#[derive(Debug, Error)]
pub enum ConcordError {
    // ═══════════════════════════════════════════════════════════════════
    // Input and configuration
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    // ═══════════════════════════════════════════════════════════════════
    // Generation engine
    // ═══════════════════════════════════════════════════════════════════

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    // ═══════════════════════════════════════════════════════════════════
    // Local resources
    // ═══════════════════════════════════════════════════════════════════

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by the text-generation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ConcordError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Engine(EngineError::ApiError { status, .. }) => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for concord.
pub type Result<T> = std::result::Result<T, ConcordError>;
