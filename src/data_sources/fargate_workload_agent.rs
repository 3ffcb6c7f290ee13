//! `sysdig_fargate_workload_agent`: instruments Fargate container definitions
//! with the Sysdig workload agent.
//!
//! The data source is pure computation. Its ID is derived from the input
//! container definitions so identical inputs map to the same identity.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::diagnostics::Diagnostic;
use crate::digest::content_id;
use crate::error::ProviderError;
use crate::kilt::{self, KiltConfiguration, PatchOptions, RecipeConfig, StackPatcher};
use crate::resources::{attribute_error, decode_attributes};

/// Data source type name.
pub const FARGATE_WORKLOAD_AGENT_DATA_SOURCE: &str = "sysdig_fargate_workload_agent";

/// Summary prefix for failures of the patch pipeline.
pub const PATCH_ERROR_SUMMARY: &str = "Error applying configuration patch";

const LOG_CONFIGURATION_FIELDS: [&str; 3] = ["group", "stream_prefix", "region"];

/// Attributes of the data source. `id` and `output_container_definitions`
/// are computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FargateWorkloadAgent {
    pub container_definitions: String,
    pub workload_agent_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sysdig_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_auth_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_containers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bare_pdig_on_containers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_configuration: Option<Vec<Map<String, Value>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sysdig_logging: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_container_definitions: Option<String>,
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

impl FargateWorkloadAgent {
    fn decode(value: Value) -> Result<Self, ProviderError> {
        decode_attributes(FARGATE_WORKLOAD_AGENT_DATA_SOURCE, value)
    }

    fn problems(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if serde_json::from_str::<Vec<Map<String, Value>>>(&self.container_definitions).is_err() {
            diagnostics.push(attribute_error(
                "container_definitions",
                "container_definitions must be a JSON array of objects",
            ));
        }
        if self.workload_agent_image.trim().is_empty() {
            diagnostics.push(attribute_error(
                "workload_agent_image",
                "workload_agent_image must not be empty",
            ));
        }

        let records = self.log_configuration.as_deref().unwrap_or_default();
        if records.len() > 1 {
            diagnostics.push(attribute_error(
                "log_configuration",
                format!("at most one log_configuration block is allowed, got {}", records.len()),
            ));
        }
        for (i, record) in records.iter().enumerate() {
            for field in LOG_CONFIGURATION_FIELDS {
                if record.get(field).and_then(Value::as_str).is_none() {
                    diagnostics.push(attribute_error(
                        &format!("log_configuration.{}.{}", i, field),
                        format!("log_configuration.{} is required", field),
                    ));
                }
            }
        }

        diagnostics
    }

    fn recipe(&self) -> RecipeConfig {
        RecipeConfig {
            sysdig_access_key: text(&self.sysdig_access_key),
            agent_image: self.workload_agent_image.clone(),
            orchestrator_host: text(&self.orchestrator_host),
            orchestrator_port: text(&self.orchestrator_port),
            collector_host: text(&self.collector_host),
            collector_port: text(&self.collector_port),
            sysdig_logging: text(&self.sysdig_logging),
        }
    }

    fn options(&self) -> PatchOptions {
        PatchOptions::resolve(
            self.bare_pdig_on_containers.as_deref(),
            self.ignore_containers.as_deref(),
            self.log_configuration.as_deref(),
        )
    }
}

/// Reads the instrumented container definitions.
#[derive(Clone)]
pub struct FargateWorkloadAgentDataSource {
    patcher: Arc<dyn StackPatcher>,
    timeout: Duration,
}

impl FargateWorkloadAgentDataSource {
    pub fn new(patcher: Arc<dyn StackPatcher>, timeout: Duration) -> Self {
        Self { patcher, timeout }
    }

    pub fn validate(config: Value) -> Vec<Diagnostic> {
        match FargateWorkloadAgent::decode(config) {
            Ok(input) => input.problems(),
            Err(e) => vec![Diagnostic::from(e)],
        }
    }

    /// Patch the configured container definitions.
    ///
    /// Returns the input attributes with `id` and
    /// `output_container_definitions` filled in.
    #[instrument(skip_all, fields(data_source = FARGATE_WORKLOAD_AGENT_DATA_SOURCE))]
    pub async fn read(&self, config: Value) -> Result<Value, ProviderError> {
        let mut input = FargateWorkloadAgent::decode(config)?;
        let records = input.log_configuration.as_deref().map_or(0, <[_]>::len);
        if records > 1 {
            return Err(ProviderError::Validation(format!(
                "at most one log_configuration block is allowed, got {}",
                records
            )));
        }

        let kilt_config = KiltConfiguration::agentino(&input.recipe(), text(&input.image_auth_secret))?;
        let options = input.options();

        let timeout = self.timeout;
        let output = kilt::patch_fargate_task_definition(
            self.patcher.clone(),
            &input.container_definitions,
            &kilt_config,
            &options,
            tokio::time::sleep(timeout),
        )
        .await
        .map_err(|e| match e {
            ProviderError::Cancelled(_) => ProviderError::DeadlineExceeded(format!(
                "patching container definitions did not finish within {:?}",
                timeout
            )),
            other => other,
        })?;

        let id = content_id(&input.container_definitions);
        info!(%id, "Instrumented container definitions");

        input.id = Some(id);
        input.output_container_definitions = Some(output);
        Ok(serde_json::to_value(&input)?)
    }

    /// Diagnostic for a failed read.
    ///
    /// Failures past input decoding are reported under
    /// [`PATCH_ERROR_SUMMARY`].
    pub fn diagnose(err: ProviderError) -> Diagnostic {
        match err {
            ProviderError::Validation(_) | ProviderError::InvalidRequest(_) => Diagnostic::from(err),
            other => {
                let summary = format!("{}: {}", PATCH_ERROR_SUMMARY, other);
                let mut diagnostic = Diagnostic::from(other);
                diagnostic.summary = summary;
                diagnostic
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kilt::{KiltConfiguration, RecipePatcher};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Identity;

    #[async_trait]
    impl StackPatcher for Identity {
        async fn patch(
            &self,
            _config: &KiltConfiguration,
            stack: Vec<u8>,
        ) -> Result<Vec<u8>, ProviderError> {
            Ok(stack)
        }
    }

    struct Stalls;

    #[async_trait]
    impl StackPatcher for Stalls {
        async fn patch(
            &self,
            _config: &KiltConfiguration,
            _stack: Vec<u8>,
        ) -> Result<Vec<u8>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::PatchFailed("unreachable".to_string()))
        }
    }

    fn source(patcher: Arc<dyn StackPatcher>) -> FargateWorkloadAgentDataSource {
        FargateWorkloadAgentDataSource::new(patcher, Duration::from_secs(30))
    }

    fn input() -> Value {
        json!({
            "container_definitions": r#"[{"name":"app","image":"nginx"}]"#,
            "workload_agent_image": "quay.io/sysdig/workload-agent:latest",
            "sysdig_access_key": "access-key",
            "collector_host": "collector.sysdigcloud.com",
            "collector_port": "6443"
        })
    }

    #[test]
    fn test_validate() {
        assert!(FargateWorkloadAgentDataSource::validate(input()).is_empty());

        let mut bad = input();
        bad["container_definitions"] = json!("{not json");
        bad["log_configuration"] = json!([{"group": "g"}, {"group": "g2"}]);
        let diags = FargateWorkloadAgentDataSource::validate(bad);
        let attrs: Vec<_> = diags.iter().filter_map(|d| d.attribute.as_deref()).collect();
        assert_eq!(
            attrs,
            vec![
                "container_definitions",
                "log_configuration",
                "log_configuration.0.stream_prefix",
                "log_configuration.0.region",
                "log_configuration.1.stream_prefix",
                "log_configuration.1.region",
            ]
        );
    }

    #[test]
    fn test_validate_requires_image() {
        let diags = FargateWorkloadAgentDataSource::validate(json!({"container_definitions": "[]"}));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("workload_agent_image"));
    }

    #[tokio::test]
    async fn test_read_sets_id_from_input() {
        let state = source(Arc::new(Identity)).read(input()).await.unwrap();
        assert_eq!(
            state["id"],
            content_id(r#"[{"name":"app","image":"nginx"}]"#).as_str()
        );
        assert_eq!(state["collector_port"], "6443");

        let output: Value =
            serde_json::from_str(state["output_container_definitions"].as_str().unwrap()).unwrap();
        assert_eq!(output, json!([{"name": "app", "image": "nginx"}]));
    }

    #[tokio::test]
    async fn test_read_with_recipe_patcher() {
        let mut cfg = input();
        cfg["container_definitions"] = json!(r#"[{"name":"app","image":"nginx","entryPoint":["nginx"]}]"#);
        cfg["log_configuration"] = json!([{"group": "g", "stream_prefix": "p", "region": "r"}]);
        cfg["bare_pdig_on_containers"] = json!([" app "]);

        let state = source(Arc::new(RecipePatcher::new())).read(cfg).await.unwrap();
        let output: Value =
            serde_json::from_str(state["output_container_definitions"].as_str().unwrap()).unwrap();

        let app = &output[0];
        assert_eq!(app["EntryPoint"], json!(["/opt/draios/bin/instrument"]));
        assert!(app["Environment"]
            .as_array()
            .unwrap()
            .contains(&json!({"Name": "__INSTRUMENTATION_WRAPPER", "Value": "/opt/draios/bin/pdig,-C,-t,-1"})));
        assert_eq!(output[1]["Name"], "SysdigInstrumentation");
        assert_eq!(output[1]["LogConfiguration"]["Options"]["awslogs-stream-prefix"], "p");
    }

    #[tokio::test]
    async fn test_read_rejects_two_log_configurations() {
        let mut cfg = input();
        cfg["log_configuration"] = json!([
            {"group": "g", "stream_prefix": "p", "region": "r"},
            {"group": "g", "stream_prefix": "p", "region": "r"}
        ]);
        let err = source(Arc::new(Identity)).read(cfg).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out() {
        let source = FargateWorkloadAgentDataSource::new(Arc::new(Stalls), Duration::from_secs(5));
        let err = source.read(input()).await.unwrap_err();
        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn test_diagnose_prefixes_patch_errors() {
        let mut cfg = input();
        cfg["container_definitions"] = json!("[{");
        let err = source(Arc::new(Identity)).read(cfg).await.unwrap_err();

        let diag = FargateWorkloadAgentDataSource::diagnose(err);
        assert!(diag.summary.starts_with("Error applying configuration patch: Decode error"));
        assert!(diag.detail.is_some());

        let diag = FargateWorkloadAgentDataSource::diagnose(ProviderError::Validation("x".into()));
        assert_eq!(diag.summary, "Validation error: x");
    }
}
