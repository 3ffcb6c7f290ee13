//! Configuration passed through to the patcher.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// The agentino recipe: wrap the workload with `instrument` and mount the
/// instrumentation sidecar.
pub const AGENTINO_KILT_DEFINITION: &str = r#"build {
    entry_point: ["/opt/draios/bin/instrument"]
    command: ${?original.entry_point} ${?original.command}
    environment_variables: {
        "SYSDIG_ORCHESTRATOR": ${config.orchestrator_host}
        "SYSDIG_ORCHESTRATOR_PORT": ${config.orchestrator_port}
        "SYSDIG_COLLECTOR": ${config.collector_host}
        "SYSDIG_COLLECTOR_PORT": ${config.collector_port}
        "SYSDIG_ACCESS_KEY": ${config.sysdig_access_key}
        "SYSDIG_LOGGING": ${config.sysdig_logging}
    }
    mount: [
        {
            name: "SysdigInstrumentation"
            image: ${config.agent_image}
            volumes: ["/opt/draios"]
            entry_point: ["/opt/draios/bin/logwriter"]
        }
    ]
}"#;

/// Values substituted into the recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeConfig {
    /// Agent access key.
    #[serde(default)]
    pub sysdig_access_key: String,
    /// Workload agent image.
    #[serde(default)]
    pub agent_image: String,
    /// Orchestrator host.
    #[serde(default)]
    pub orchestrator_host: String,
    /// Orchestrator port.
    #[serde(default)]
    pub orchestrator_port: String,
    /// Collector host.
    #[serde(default)]
    pub collector_host: String,
    /// Collector port.
    #[serde(default)]
    pub collector_port: String,
    /// Instrumentation logging level.
    #[serde(default)]
    pub sysdig_logging: String,
}

/// Patcher configuration. Opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KiltConfiguration {
    /// Recipe definition text.
    pub kilt: String,
    /// Secret used to pull the sidecar image.
    pub image_auth_secret: String,
    /// Only patch containers that opt in.
    pub opt_in: bool,
    /// Resolve image entry points from registry metadata.
    pub use_repository_hints: bool,
    /// JSON-encoded [`RecipeConfig`].
    pub recipe_config: String,
}

impl KiltConfiguration {
    /// Build the agentino configuration used by the Fargate data source.
    pub fn agentino(
        recipe: &RecipeConfig,
        image_auth_secret: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let recipe_config = serde_json::to_string(recipe).map_err(|e| {
            ProviderError::Configuration(format!("Failed to serialize configuration: {}", e))
        })?;
        Ok(Self {
            kilt: AGENTINO_KILT_DEFINITION.to_string(),
            image_auth_secret: image_auth_secret.into(),
            opt_in: false,
            use_repository_hints: true,
            recipe_config,
        })
    }

    /// Decode the embedded recipe values.
    pub fn recipe(&self) -> Result<RecipeConfig, ProviderError> {
        if self.recipe_config.trim().is_empty() {
            return Ok(RecipeConfig::default());
        }
        Ok(serde_json::from_str(&self.recipe_config)?)
    }
}
