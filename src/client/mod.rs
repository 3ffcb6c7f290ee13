//! HTTP client for the Sysdig Monitor and Sysdig Secure APIs.
//!
//! One [`SysdigClient`] is built per configured API. Entity-specific calls live
//! in submodules behind traits so resources can run against in-memory fakes.

pub mod group_mapping;
pub mod notification_channel;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub use group_mapping::{GroupMapping, GroupMappingApi, TeamMap};
pub use notification_channel::{
    NotificationChannel, NotificationChannelApi, NotificationChannelOptions,
    TemplateConfiguration, TemplateConfigurationSection,
};

use crate::config::ApiConfig;
use crate::error::ProviderError;

/// A raw API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response body as text.
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Convert this response into an API error.
    pub fn into_error(self) -> ProviderError {
        error_from_response(self.status, &self.body)
    }

    /// Decode a fetched entity. `404` means `what` does not exist.
    pub fn into_entity<T: DeserializeOwned>(
        self,
        what: impl FnOnce() -> String,
    ) -> Result<T, ProviderError> {
        match self.status {
            StatusCode::OK => self.json(),
            StatusCode::NOT_FOUND => Err(ProviderError::NotFound(what())),
            _ => Err(self.into_error()),
        }
    }

    /// Outcome of a delete. An entity that is already gone counts as deleted.
    pub fn into_deleted(self) -> Result<(), ProviderError> {
        match self.status {
            StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(self.into_error()),
        }
    }
}

/// Client for one Sysdig API endpoint.
#[derive(Clone)]
pub struct SysdigClient {
    http: Client,
    base_url: String,
    token: SecretString,
}

impl std::fmt::Debug for SysdigClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysdigClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SysdigClient {
    /// Build a client for `api`.
    ///
    /// Fails with a configuration error if the API has no token or an extra
    /// header is not a valid HTTP header.
    pub fn new(
        api: &ApiConfig,
        extra_headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let token = api.require_token()?.clone();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (key, value) in extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                ProviderError::Configuration(format!("invalid extra header name '{}': {}", key, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ProviderError::Configuration(format!("invalid value for extra header '{}': {}", key, e))
            })?;
            headers.insert(name, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(api.insecure_tls)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: api.url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// The API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and return the raw response, whatever its status.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResponse, ProviderError> {
        let url = self.url(path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(self.token.expose_secret());
        if let Some(body) = body {
            let payload = serde_json::to_string(body)?;
            debug!(%method, %url, body = %payload, "Sysdig API request");
            request = request.body(payload);
        } else {
            debug!(%method, %url, "Sysdig API request");
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(%method, %url, status = status.as_u16(), body = %body, "Sysdig API response");

        Ok(ApiResponse { status, body })
    }
}

/// Build an API error from a non-success response.
///
/// The message is the body's `message` followed by the `reason` and
/// `message` of every `errors[]` entry, joined with `", "`. A body that is
/// not JSON, lacks `message`, or has an incomplete `errors[]` entry yields
/// the status line instead.
pub fn error_from_response(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| error_parts(&value))
        .map(|parts| parts.join(", "))
        .unwrap_or_else(|| match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        });

    ProviderError::Api {
        status: status.as_u16(),
        message,
    }
}

fn error_parts(value: &Value) -> Option<Vec<String>> {
    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    let mut parts = vec![text(value, "message")?];
    if let Some(errors) = value.get("errors").and_then(Value::as_array) {
        for error in errors {
            parts.push(text(error, "reason")?);
            parts.push(text(error, "message")?);
        }
    }
    Some(parts)
}
