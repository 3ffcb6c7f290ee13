//! Error types for the Sysdig provider.

use thiserror::Error;

/// Errors that can occur while serving a provider operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested remote entity does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The user-supplied configuration failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The configuration is well formed but incomplete.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed JSON at a deserialization boundary.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The container definition patcher failed or panicked.
    #[error("Patch failed: {0}")]
    PatchFailed(String),

    /// The HTTP layer could not reach the Sysdig API.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The Sysdig API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The operation did not complete within its timeout.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The requested resource or data source type is unknown.
    #[error("{0}")]
    UnknownResource(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Invalid request from the host, such as a malformed resource ID.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Get the error message without its category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::Decode(_err) => "malformed JSON (see Debug output)",
            Self::PatchFailed(msg) => msg,
            Self::Transport(_err) => "transport error (see Debug output)",
            Self::Api { message, .. } => message,
            Self::Cancelled(msg) => msg,
            Self::DeadlineExceeded(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Unimplemented(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Whether this error means the remote entity no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("notification channel 42".to_string());
        assert_eq!(
            format!("{}", err),
            "Resource not found: notification channel 42"
        );

        let err = ProviderError::PatchFailed("boom".to_string());
        assert_eq!(format!("{}", err), "Patch failed: boom");

        let err = ProviderError::UnknownResource("Unknown resource type: sysdig_unknown".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: sysdig_unknown");

        let err = ProviderError::Api {
            status: 422,
            message: "bad channel".to_string(),
        };
        assert_eq!(format!("{}", err), "API error (422): bad channel");
    }

    #[test]
    fn test_decode_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ProviderError = serde_err.into();
        assert!(matches!(err, ProviderError::Decode(_)));
        assert!(format!("{}", err).starts_with("Decode error: "));
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("missing group".to_string());
        assert_eq!(err.message(), "missing group");

        let err = ProviderError::Api {
            status: 500,
            message: "internal".to_string(),
        };
        assert_eq!(err.message(), "internal");

        let err = ProviderError::Cancelled("patch".to_string());
        assert_eq!(err.message(), "patch");
    }

    #[test]
    fn test_is_not_found() {
        assert!(ProviderError::NotFound("x".to_string()).is_not_found());
        assert!(!ProviderError::Validation("x".to_string()).is_not_found());
    }
}
