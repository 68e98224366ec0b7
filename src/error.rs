//! Error types for background removal requests

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error taxonomy for the request pipeline and its collaborators
///
/// `Decode`, `Inference`, `Encode` and `Transport` are per-request failures:
/// they are caught at the request handler and turned into one user-facing
/// message. `Config` is only produced at startup and aborts the process.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input bytes are not a parseable image or cannot be normalized to RGB
    #[error("Decode error: {0}")]
    Decode(String),

    /// Backend unreachable, non-success response, timeout, or undecodable output
    #[error("Inference error: {0}")]
    Inference(String),

    /// Output container could not be produced
    #[error("Encode error: {0}")]
    Encode(String),

    /// Failure acquiring bytes from or delivering bytes to the chat transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Missing or invalid configuration at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input/output errors (model file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violations that indicate a defect
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error for a missing environment variable
    pub fn missing_env(variable: &str, purpose: &str) -> Self {
        Self::Config(format!(
            "Environment variable {} is required ({})",
            variable, purpose
        ))
    }

    /// Create a configuration error with the accepted values
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::Config(format!(
            "Invalid {}: {} (expected: {})",
            parameter, value, valid_range
        ))
    }

    /// Create a network error from a reqwest failure, keeping the operation name
    pub fn network_error(operation: &str, error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            "timed out"
        } else if error.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        Self::Transport(format!("{} {}: {}", operation, kind, error))
    }

    /// Create model error with the file and suggestions
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Config(format!(
            "Failed to {} model '{}': {}.{}",
            operation,
            model_path.as_ref().display(),
            error,
            suggestion_text
        ))
    }

    /// Short machine-friendly name of the error class, used in log fields
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DecodeError",
            Self::Inference(_) => "InferenceError",
            Self::Encode(_) => "EncodeError",
            Self::Transport(_) => "TransportError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
            Self::Internal(_) => "InternalError",
        }
    }
}
