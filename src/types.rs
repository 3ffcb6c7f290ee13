//! Value types exchanged with the host.

use serde::{Deserialize, Serialize};

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: serde_json::Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: serde_json::Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata: the type names the provider serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
}

impl ProviderMetadata {
    pub fn new<R, D>(resources: R, data_sources: D) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            data_sources: data_sources.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `name` is a served resource type.
    pub fn has_resource(&self, name: &str) -> bool {
        self.resources.iter().any(|r| r == name)
    }

    /// Whether `name` is a served data source type.
    pub fn has_data_source(&self, name: &str) -> bool {
        self.data_sources.iter().any(|d| d == name)
    }
}
