//! Huginn error types

use std::time::Duration;

use crate::query::QueryError;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Load-time errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    // Per-cycle errors, scoped to one definition
    #[error("argument resolution error: {0}")]
    ArgumentResolution(String),

    #[error("remote call {service}.{operation} failed: {reason}")]
    RemoteCall {
        service: String,
        operation: String,
        reason: String,
    },

    #[error("record shape error in metric '{metric}': {reason}")]
    RecordShape { metric: String, reason: String },

    // Transport errors, raised below the call driver
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HuginnError {
    /// Whether the error is worth retrying.
    ///
    /// Network failures, throttling and server-side (5xx) API errors are
    /// transient. Everything else, including configuration and shape
    /// errors, is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginnError::Http(_) | HuginnError::RateLimited { .. } => true,
            HuginnError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Short label for telemetry and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HuginnError::Configuration(_) => "configuration",
            HuginnError::Query(_) => "query",
            HuginnError::ArgumentResolution(_) => "argument_resolution",
            HuginnError::RemoteCall { .. } => "remote_call",
            HuginnError::RecordShape { .. } => "record_shape",
            HuginnError::Http(_)
            | HuginnError::Api { .. }
            | HuginnError::RateLimited { .. }
            | HuginnError::AuthenticationFailed
            | HuginnError::UnknownOperation(_) => "transport",
            HuginnError::Json(_) | HuginnError::Io(_) => "data",
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
