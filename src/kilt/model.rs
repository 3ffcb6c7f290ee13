//! Container definitions as ordered, mostly opaque JSON objects.
//!
//! The ECS container definition schema is owned upstream, so a definition is
//! kept as a generic map. Only the handful of keys the post-patch editor
//! touches get typed accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the sidecar container injected by the patcher.
pub const SIDECAR_CONTAINER_NAME: &str = "SysdigInstrumentation";

/// A single container definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerDefinition(Map<String, Value>);

impl ContainerDefinition {
    /// Wrap an existing JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// The container name, if the `Name` key holds a string.
    pub fn name(&self) -> Option<&str> {
        self.0.get("Name").and_then(Value::as_str)
    }

    /// Whether this is the instrumentation sidecar.
    pub fn is_sidecar(&self) -> bool {
        self.name() == Some(SIDECAR_CONTAINER_NAME)
    }

    /// Replace the `LogConfiguration` block.
    pub fn set_log_configuration(&mut self, log_configuration: Value) {
        self.insert("LogConfiguration", log_configuration);
    }

    /// Append an entry to the `Environment` list, creating the list if absent.
    pub fn append_environment(&mut self, name: &str, value: &str) {
        self.push("Environment", serde_json::json!({ "Name": name, "Value": value }));
    }

    /// Append `entry` to the list stored under `key`, creating it if absent.
    ///
    /// A scalar or object already stored under `key` is kept as the first
    /// element of the new list.
    pub fn push(&mut self, key: &str, entry: Value) {
        match self.0.get_mut(key) {
            Some(Value::Array(items)) => items.push(entry),
            Some(Value::Null) | None => {
                self.0.insert(key.to_string(), Value::Array(vec![entry]));
            },
            Some(other) => {
                let existing = other.take();
                *other = Value::Array(vec![existing, entry]);
            },
        }
    }

    /// Set `key` to `value`, returning the previous value.
    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.0.insert(key.to_string(), value)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Read access to the underlying fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the definition, returning the underlying fields.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ContainerDefinition {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}
