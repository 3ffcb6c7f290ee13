//! Instrumentation options supplied alongside the container definitions.

use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Log driver attached to the sidecar container.
pub const AWSLOGS_DRIVER: &str = "awslogs";

/// A `log_configuration` block as supplied by the user.
///
/// The sub-fields are only checked when the block is used, so a block missing
/// `group`, `stream_prefix` or `region` still resolves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogConfiguration(Map<String, Value>);

impl LogConfiguration {
    /// Wrap a raw configuration record.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build a configuration from its three parts.
    pub fn from_parts(group: &str, stream_prefix: &str, region: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("group".to_string(), Value::from(group));
        fields.insert("stream_prefix".to_string(), Value::from(stream_prefix));
        fields.insert("region".to_string(), Value::from(region));
        Self(fields)
    }

    fn required(&self, key: &str) -> Result<&str, ProviderError> {
        self.0.get(key).and_then(Value::as_str).ok_or_else(|| {
            ProviderError::Configuration(format!(
                "log_configuration is missing required string field '{}'",
                key
            ))
        })
    }

    /// The awslogs log group.
    pub fn group(&self) -> Result<&str, ProviderError> {
        self.required("group")
    }

    /// The awslogs stream prefix.
    pub fn stream_prefix(&self) -> Result<&str, ProviderError> {
        self.required("stream_prefix")
    }

    /// The awslogs region.
    pub fn region(&self) -> Result<&str, ProviderError> {
        self.required("region")
    }

    /// Render the ECS `LogConfiguration` block for the sidecar.
    pub fn to_log_driver_block(&self) -> Result<Value, ProviderError> {
        Ok(serde_json::json!({
            "LogDriver": AWSLOGS_DRIVER,
            "Options": {
                "awslogs-group": self.group()?,
                "awslogs-stream-prefix": self.stream_prefix()?,
                "awslogs-region": self.region()?,
            }
        }))
    }
}

/// Options controlling the post-patch edits and the ignore tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchOptions {
    /// Containers the patcher must leave uninstrumented.
    pub ignore_containers: Vec<String>,
    /// Containers that run the workload under bare pdig.
    pub bare_pdig_on_containers: Vec<String>,
    /// awslogs settings for the sidecar container.
    pub log_configuration: Option<LogConfiguration>,
}

impl PatchOptions {
    /// Resolve options from raw user input.
    ///
    /// Absent lists resolve to empty ones and every name is trimmed. Only the
    /// first `log_configuration` record is used.
    pub fn resolve(
        bare_pdig_on_containers: Option<&[String]>,
        ignore_containers: Option<&[String]>,
        log_configuration: Option<&[Map<String, Value>]>,
    ) -> Self {
        Self {
            ignore_containers: trimmed(ignore_containers),
            bare_pdig_on_containers: trimmed(bare_pdig_on_containers),
            log_configuration: log_configuration
                .and_then(|records| records.first())
                .cloned()
                .map(LogConfiguration::new),
        }
    }

    /// Whether the post-patch editor has nothing to do.
    pub fn is_noop(&self) -> bool {
        self.log_configuration.is_none() && self.bare_pdig_on_containers.is_empty()
    }

    /// Whether `name` should receive the bare pdig wrapper.
    pub fn wants_bare_pdig(&self, name: &str) -> bool {
        self.bare_pdig_on_containers.iter().any(|c| c == name)
            && !self.ignore_containers.iter().any(|c| c == name)
    }
}

fn trimmed(items: Option<&[String]>) -> Vec<String> {
    items
        .unwrap_or_default()
        .iter()
        .map(|item| item.trim().to_string())
        .collect()
}
