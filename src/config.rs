//! Provider configuration.
//!
//! Every setting can come from the host's provider block or, when absent
//! there, from the environment. Empty strings count as unset.

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ProviderError;

/// Default Sysdig Secure endpoint.
pub const DEFAULT_SECURE_URL: &str = "https://secure.sysdig.com";

/// Default Sysdig Monitor endpoint.
pub const DEFAULT_MONITOR_URL: &str = "https://app.sysdigcloud.com";

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// The provider block as sent by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderBlock {
    /// Sysdig Secure URL.
    pub sysdig_secure_url: Option<String>,
    /// Sysdig Secure API token.
    pub sysdig_secure_api_token: Option<String>,
    /// Skip TLS verification against Sysdig Secure.
    pub sysdig_secure_insecure_tls: Option<bool>,
    /// Sysdig Monitor URL.
    pub sysdig_monitor_url: Option<String>,
    /// Sysdig Monitor API token.
    pub sysdig_monitor_api_token: Option<String>,
    /// Skip TLS verification against Sysdig Monitor.
    pub sysdig_monitor_insecure_tls: Option<bool>,
    /// Headers added to every API request.
    pub extra_headers: Option<BTreeMap<String, String>>,
    /// Per-operation timeout in seconds.
    pub timeout_seconds: Option<u64>,
}

/// Connection settings for one Sysdig API.
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL without a trailing slash.
    pub url: String,
    /// Bearer token; `None` if this API is not configured.
    pub token: Option<SecretString>,
    /// Skip TLS certificate verification.
    pub insecure_tls: bool,
    /// Environment variable holding the token, for error messages.
    pub token_env: &'static str,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("token", &self.token.is_some())
            .field("insecure_tls", &self.insecure_tls)
            .finish()
    }
}

impl ApiConfig {
    /// The token, or a configuration error naming its variable.
    pub fn require_token(&self) -> Result<&SecretString, ProviderError> {
        self.token.as_ref().ok_or_else(|| self.missing_token())
    }

    /// The error reported when this API is used without a token.
    pub fn missing_token(&self) -> ProviderError {
        ProviderError::Configuration(format!(
            "missing API token for {}: set {} or the provider attribute",
            self.url, self.token_env
        ))
    }
}

/// Resolved provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Sysdig Secure connection.
    pub secure: ApiConfig,
    /// Sysdig Monitor connection.
    pub monitor: ApiConfig,
    /// Headers added to every API request.
    pub extra_headers: BTreeMap<String, String>,
    /// Per-operation timeout.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Resolve the host's provider block against the process environment.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        let block = if value.is_null() {
            ProviderBlock::default()
        } else {
            serde_json::from_value(value)
                .map_err(|e| ProviderError::Validation(format!("provider configuration: {}", e)))?
        };
        Self::resolve(block, |key| std::env::var(key).ok())
    }

    /// Resolve a provider block, reading fallbacks through `env`.
    pub fn resolve<E>(block: ProviderBlock, env: E) -> Result<Self, ProviderError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let secure = ApiConfig {
            url: api_url(
                block.sysdig_secure_url,
                lookup("SYSDIG_SECURE_URL"),
                DEFAULT_SECURE_URL,
            ),
            token: non_empty(block.sysdig_secure_api_token)
                .or_else(|| lookup("SYSDIG_SECURE_API_TOKEN"))
                .map(SecretString::from),
            insecure_tls: match block.sysdig_secure_insecure_tls {
                Some(v) => v,
                None => parse_bool("SYSDIG_SECURE_INSECURE_TLS", lookup("SYSDIG_SECURE_INSECURE_TLS"))?,
            },
            token_env: "SYSDIG_SECURE_API_TOKEN",
        };

        let monitor = ApiConfig {
            url: api_url(
                block.sysdig_monitor_url,
                lookup("SYSDIG_MONITOR_URL"),
                DEFAULT_MONITOR_URL,
            ),
            token: non_empty(block.sysdig_monitor_api_token)
                .or_else(|| lookup("SYSDIG_MONITOR_API_TOKEN"))
                .map(SecretString::from),
            insecure_tls: match block.sysdig_monitor_insecure_tls {
                Some(v) => v,
                None => parse_bool(
                    "SYSDIG_MONITOR_INSECURE_TLS",
                    lookup("SYSDIG_MONITOR_INSECURE_TLS"),
                )?,
            },
            token_env: "SYSDIG_MONITOR_API_TOKEN",
        };

        let timeout = match block.timeout_seconds {
            Some(0) => {
                return Err(ProviderError::Validation(
                    "timeout_seconds must be greater than zero".to_string(),
                ))
            },
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            secure,
            monitor,
            extra_headers: block.extra_headers.unwrap_or_default(),
            timeout,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn api_url(configured: Option<String>, env: Option<String>, default: &str) -> String {
    non_empty(configured)
        .or(env)
        .unwrap_or_else(|| default.to_string())
        .trim()
        .trim_end_matches('/')
        .to_string()
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool, ProviderError> {
    match value.as_deref().map(str::trim) {
        None => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ProviderError::Configuration(format!(
            "{} must be 'true' or 'false', got '{}'",
            key, other
        ))),
    }
}
