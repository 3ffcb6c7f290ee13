//! Diagnostics returned to the host at the end of every lifecycle call.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        matches!(self.severity, DiagnosticSeverity::Error)
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        let diagnostic = Diagnostic::error(err.to_string());
        match err {
            ProviderError::Decode(inner) => diagnostic.with_detail(format!(
                "line {}, column {}",
                inner.line(),
                inner.column()
            )),
            ProviderError::Transport(inner) => match inner.url() {
                Some(url) => diagnostic.with_detail(format!("request to {}", url)),
                None => diagnostic,
            },
            _ => diagnostic,
        }
    }
}

/// Whether any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_builder() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("missing field `group`")
            .with_attribute("log_configuration.0.group");

        assert_eq!(err.severity, DiagnosticSeverity::Error);
        assert_eq!(err.summary, "Invalid configuration");
        assert_eq!(err.detail, Some("missing field `group`".to_string()));
        assert_eq!(err.attribute, Some("log_configuration.0.group".to_string()));
        assert!(err.is_error());

        let warn = Diagnostic::warning("deprecated");
        assert!(!warn.is_error());
    }

    #[test]
    fn test_from_provider_error() {
        let diag: Diagnostic = ProviderError::PatchFailed("boom".to_string()).into();
        assert!(diag.is_error());
        assert_eq!(diag.summary, "Patch failed: boom");
        assert!(diag.detail.is_none());
    }

    #[test]
    fn test_from_decode_error_carries_position() {
        let serde_err = serde_json::from_str::<serde_json::Value>("[1,").unwrap_err();
        let diag: Diagnostic = ProviderError::from(serde_err).into();
        assert!(diag.summary.starts_with("Decode error"));
        assert!(diag.detail.unwrap().starts_with("line 1"));
    }

    #[test]
    fn test_has_errors() {
        let diags = vec![
            Diagnostic::warning("w"),
            ProviderError::NotFound("7".to_string()).into(),
        ];
        assert!(has_errors(&diags));
        assert_eq!(diags[1].summary, "Resource not found: 7");
        assert!(!has_errors(&diags[..1]));
    }

    #[test]
    fn test_severity_serialization() {
        let json = serde_json::to_value(Diagnostic::warning("w")).unwrap();
        assert_eq!(json["severity"], "warning");
        assert!(json.get("detail").is_none());
    }
}
