//! Built-in patcher implementing the agentino recipe.
//!
//! Every Fargate task definition in the stack has its containers rewritten to
//! start under `/opt/draios/bin/instrument`, with the instrumentation files
//! mounted from a `SysdigInstrumentation` sidecar. Containers that declare
//! neither `EntryPoint` nor `Command` start through their image's defaults,
//! which are not looked up, so they are left as they are. Container definitions may
//! arrive in ECS (camelCase) or CloudFormation (PascalCase) form; they always
//! leave in PascalCase.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::config::{KiltConfiguration, RecipeConfig};
use super::model::{ContainerDefinition, SIDECAR_CONTAINER_NAME};
use super::patcher::StackPatcher;
use super::stack::{FARGATE, IGNORE_CONTAINERS_TAG, TASK_DEFINITION_TYPE};
use crate::error::ProviderError;

/// Entry point that wraps the workload.
pub const INSTRUMENT_ENTRY_POINT: &str = "/opt/draios/bin/instrument";

/// Entry point of the sidecar.
pub const LOGWRITER_ENTRY_POINT: &str = "/opt/draios/bin/logwriter";

/// Keys whose values are user-keyed maps and keep their keys verbatim.
const FREE_FORM_KEYS: &[&str] = &["Options", "DockerLabels"];

/// The default [`StackPatcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipePatcher;

impl RecipePatcher {
    /// Create the patcher.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StackPatcher for RecipePatcher {
    async fn patch(
        &self,
        config: &KiltConfiguration,
        stack: Vec<u8>,
    ) -> Result<Vec<u8>, ProviderError> {
        if config.opt_in {
            return Err(ProviderError::Unimplemented(
                "opt-in patching is not supported by the built-in recipe".to_string(),
            ));
        }
        let recipe = config.recipe()?;
        if recipe.agent_image.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "the workload agent image is required".to_string(),
            ));
        }

        let mut document: Value = serde_json::from_slice(&stack)?;
        let resources = document
            .get_mut("Resources")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ProviderError::PatchFailed("stack has no Resources".to_string()))?;

        for (logical_id, resource) in resources.iter_mut() {
            if !is_fargate_task_definition(resource) {
                debug!(resource = %logical_id, "Skipping resource");
                continue;
            }
            let Some(properties) = resource.get_mut("Properties").and_then(Value::as_object_mut)
            else {
                continue;
            };
            let instrumented = patch_task_definition(properties, &recipe, config)?;
            info!(resource = %logical_id, instrumented, "Patched task definition");
        }

        Ok(serde_json::to_vec(&document)?)
    }
}

fn is_fargate_task_definition(resource: &Value) -> bool {
    resource.get("Type").and_then(Value::as_str) == Some(TASK_DEFINITION_TYPE)
        && resource
            .pointer("/Properties/RequiresCompatibilities")
            .and_then(Value::as_array)
            .is_some_and(|launch_types| launch_types.iter().any(|t| t == FARGATE))
}

fn ignored_containers(properties: &Map<String, Value>) -> Vec<String> {
    properties
        .get("Tags")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|tag| tag.get("Key").and_then(Value::as_str) == Some(IGNORE_CONTAINERS_TAG))
        .filter_map(|tag| tag.get("Value").and_then(Value::as_str))
        .flat_map(|value| value.split(':'))
        .map(str::to_string)
        .collect()
}

/// Returns the number of workload containers instrumented.
fn patch_task_definition(
    properties: &mut Map<String, Value>,
    recipe: &RecipeConfig,
    config: &KiltConfiguration,
) -> Result<usize, ProviderError> {
    let ignored = ignored_containers(properties);

    let mut raw = properties
        .shift_remove("ContainerDefinitions")
        .unwrap_or_else(|| Value::Array(Vec::new()));
    pascal_case_keys(&mut raw);
    let mut containers: Vec<ContainerDefinition> = serde_json::from_value(raw)?;

    let mut instrumented = 0;
    let mut has_sidecar = false;
    for container in containers.iter_mut() {
        if container.is_sidecar() {
            has_sidecar = true;
            continue;
        }
        let Some(name) = container.name().map(str::to_string) else {
            continue;
        };
        if ignored.iter().any(|i| *i == name) {
            continue;
        }
        if !has_launch_command(container) {
            warn!(
                container = %name,
                "Leaving container uninstrumented: set entryPoint or command to instrument it"
            );
            continue;
        }
        instrument(container, recipe);
        instrumented += 1;
    }

    if instrumented > 0 && !has_sidecar {
        containers.push(sidecar(recipe, config));
    }

    properties.insert(
        "ContainerDefinitions".to_string(),
        serde_json::to_value(containers)?,
    );
    Ok(instrumented)
}

/// Without an explicit entry point or command the workload is started by the
/// image's own ENTRYPOINT/CMD, which this patcher cannot see.
fn has_launch_command(container: &ContainerDefinition) -> bool {
    ["EntryPoint", "Command"].iter().any(|key| {
        container.fields().get(*key).is_some_and(|value| match value {
            Value::Array(items) => !items.is_empty(),
            Value::String(s) => !s.is_empty(),
            _ => false,
        })
    })
}

fn instrument(container: &mut ContainerDefinition, recipe: &RecipeConfig) {
    let mut command = string_list(container.remove("EntryPoint"));
    command.extend(string_list(container.remove("Command")));

    container.insert("EntryPoint", json!([INSTRUMENT_ENTRY_POINT]));
    if !command.is_empty() {
        container.insert("Command", Value::Array(command));
    }

    for (name, value) in recipe_environment(recipe) {
        if !value.is_empty() {
            container.append_environment(name, value);
        }
    }

    container.push(
        "VolumesFrom",
        json!({ "SourceContainer": SIDECAR_CONTAINER_NAME, "ReadOnly": true }),
    );
}

fn recipe_environment(recipe: &RecipeConfig) -> [(&'static str, &str); 6] {
    [
        ("SYSDIG_ORCHESTRATOR", recipe.orchestrator_host.as_str()),
        ("SYSDIG_ORCHESTRATOR_PORT", recipe.orchestrator_port.as_str()),
        ("SYSDIG_COLLECTOR", recipe.collector_host.as_str()),
        ("SYSDIG_COLLECTOR_PORT", recipe.collector_port.as_str()),
        ("SYSDIG_ACCESS_KEY", recipe.sysdig_access_key.as_str()),
        ("SYSDIG_LOGGING", recipe.sysdig_logging.as_str()),
    ]
}

fn sidecar(recipe: &RecipeConfig, config: &KiltConfiguration) -> ContainerDefinition {
    let mut sidecar = ContainerDefinition::default();
    sidecar.insert("Name", json!(SIDECAR_CONTAINER_NAME));
    sidecar.insert("Image", json!(recipe.agent_image));
    sidecar.insert("EntryPoint", json!([LOGWRITER_ENTRY_POINT]));
    if !config.image_auth_secret.is_empty() {
        sidecar.insert(
            "RepositoryCredentials",
            json!({ "CredentialsParameter": config.image_auth_secret }),
        );
    }
    sidecar
}

fn string_list(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items,
        Some(Value::String(s)) => vec![Value::String(s)],
        _ => Vec::new(),
    }
}

/// Upper-case the first letter of every object key, leaving user-keyed maps
/// such as log driver options alone.
fn pascal_case_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let fields = std::mem::take(map);
            for (key, mut inner) in fields {
                let key = capitalize(&key);
                if !FREE_FORM_KEYS.contains(&key.as_str()) {
                    pascal_case_keys(&mut inner);
                }
                map.insert(key, inner);
            }
        },
        Value::Array(items) => items.iter_mut().for_each(pascal_case_keys),
        _ => {},
    }
}

fn capitalize(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
