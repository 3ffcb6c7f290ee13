//! Managed resources.
//!
//! Each resource decodes the host's JSON state into a typed model, talks to
//! its API trait and encodes the result back. `read` returns `None` when the
//! remote entity is gone.

pub mod group_mapping;
pub mod notification_channel_slack;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use group_mapping::{GroupMappingResource, GROUP_MAPPING_RESOURCE};
pub use notification_channel_slack::{SlackNotificationChannelResource, SLACK_CHANNEL_RESOURCE};

use crate::diagnostics::Diagnostic;
use crate::error::ProviderError;

/// Decode resource attributes, reporting failures as validation errors.
pub(crate) fn decode_attributes<T: DeserializeOwned>(
    type_name: &str,
    value: Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::Validation(format!("invalid {} configuration: {}", type_name, e)))
}

/// Numeric remote ID stored as the `id` attribute.
pub(crate) fn state_id(state: &Value) -> Result<i64, ProviderError> {
    match state.get("id") {
        Some(Value::String(s)) => parse_id(s),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ProviderError::InvalidRequest(format!("invalid resource id: {}", n))),
        _ => Err(ProviderError::InvalidRequest(
            "resource state has no id".to_string(),
        )),
    }
}

/// Parse a resource ID given by the host.
pub(crate) fn parse_id(id: &str) -> Result<i64, ProviderError> {
    id.trim()
        .parse()
        .map_err(|_| ProviderError::InvalidRequest(format!("invalid resource id: '{}'", id)))
}

/// An error diagnostic pinned to `attribute`.
pub(crate) fn attribute_error(attribute: &str, summary: impl Into<String>) -> Diagnostic {
    Diagnostic::error(summary).with_attribute(attribute)
}
