//! The Sysdig provider.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::client::{GroupMappingApi, NotificationChannelApi, SysdigClient};
use crate::config::{ProviderConfig, DEFAULT_TIMEOUT};
use crate::data_sources::{FargateWorkloadAgentDataSource, FARGATE_WORKLOAD_AGENT_DATA_SOURCE};
use crate::diagnostics::Diagnostic;
use crate::error::ProviderError;
use crate::kilt::{RecipePatcher, StackPatcher};
use crate::resources::{
    GroupMappingResource, SlackNotificationChannelResource, GROUP_MAPPING_RESOURCE,
    SLACK_CHANNEL_RESOURCE,
};
use crate::server::ProviderService;
use crate::types::{ImportedResource, ProviderMetadata};

/// API clients used by the managed resources.
#[derive(Clone, Default)]
pub struct ApiClients {
    /// Sysdig Secure notification channels.
    pub notification_channels: Option<Arc<dyn NotificationChannelApi>>,
    /// Group mappings.
    pub group_mappings: Option<Arc<dyn GroupMappingApi>>,
}

impl ApiClients {
    /// Build HTTP clients for every API that has a token.
    ///
    /// Group mappings go to Sysdig Secure when it is configured and to Sysdig
    /// Monitor otherwise.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let build = |api: &crate::config::ApiConfig| -> Result<Option<SysdigClient>, ProviderError> {
            if api.token.is_none() {
                return Ok(None);
            }
            SysdigClient::new(api, &config.extra_headers, config.timeout).map(Some)
        };
        let secure = build(&config.secure)?.map(Arc::new);
        let monitor = build(&config.monitor)?.map(Arc::new);

        let group_mappings = secure
            .clone()
            .or_else(|| monitor.clone())
            .map(|c| c as Arc<dyn GroupMappingApi>);

        Ok(Self {
            notification_channels: secure.map(|c| c as Arc<dyn NotificationChannelApi>),
            group_mappings,
        })
    }
}

struct Configured {
    config: ProviderConfig,
    clients: ApiClients,
}

/// Provider for Sysdig Monitor and Sysdig Secure.
pub struct SysdigProvider {
    patcher: Arc<dyn StackPatcher>,
    injected: Option<ApiClients>,
    state: RwLock<Option<Configured>>,
}

impl Default for SysdigProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SysdigProvider {
    /// A provider that patches with [`RecipePatcher`] and talks HTTP.
    pub fn new() -> Self {
        Self {
            patcher: Arc::new(RecipePatcher::new()),
            injected: None,
            state: RwLock::new(None),
        }
    }

    /// Replace the container definition patcher.
    pub fn with_patcher(mut self, patcher: Arc<dyn StackPatcher>) -> Self {
        self.patcher = patcher;
        self
    }

    /// Use `clients` instead of building HTTP clients on configure.
    pub fn with_clients(mut self, clients: ApiClients) -> Self {
        self.injected = Some(clients);
        self
    }

    async fn timeout(&self) -> Duration {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.config.timeout)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    async fn notification_channels(&self) -> Result<Arc<dyn NotificationChannelApi>, ProviderError> {
        let state = self.state.read().await;
        let configured = state.as_ref().ok_or_else(not_configured)?;
        configured
            .clients
            .notification_channels
            .clone()
            .ok_or_else(|| configured.config.secure.missing_token())
    }

    async fn group_mappings(&self) -> Result<Arc<dyn GroupMappingApi>, ProviderError> {
        let state = self.state.read().await;
        let configured = state.as_ref().ok_or_else(not_configured)?;
        configured
            .clients
            .group_mappings
            .clone()
            .ok_or_else(|| configured.config.secure.missing_token())
    }

    async fn slack(&self) -> Result<SlackNotificationChannelResource, ProviderError> {
        Ok(SlackNotificationChannelResource::new(self.notification_channels().await?))
    }

    async fn group_mapping(&self) -> Result<GroupMappingResource, ProviderError> {
        Ok(GroupMappingResource::new(self.group_mappings().await?))
    }

    /// Run `operation` under the configured timeout.
    async fn with_deadline<T, F>(&self, operation: &str, fut: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let timeout = self.timeout().await;
        tokio::time::timeout(timeout, fut).await.map_err(|_| {
            ProviderError::DeadlineExceeded(format!("{} did not finish within {:?}", operation, timeout))
        })?
    }
}

fn not_configured() -> ProviderError {
    ProviderError::Configuration("provider has not been configured".to_string())
}

fn unknown_resource(resource_type: &str) -> ProviderError {
    ProviderError::UnknownResource(format!("Unknown resource type: {}", resource_type))
}

#[async_trait::async_trait]
impl ProviderService for SysdigProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new(
            [SLACK_CHANNEL_RESOURCE, GROUP_MAPPING_RESOURCE],
            [FARGATE_WORKLOAD_AGENT_DATA_SOURCE],
        )
    }

    fn diagnose(&self, type_name: &str, err: ProviderError) -> Diagnostic {
        if type_name == FARGATE_WORKLOAD_AGENT_DATA_SOURCE {
            FargateWorkloadAgentDataSource::diagnose(err)
        } else {
            Diagnostic::from(err)
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(match ProviderConfig::from_value(config) {
            Ok(_) => Vec::new(),
            Err(e) => vec![Diagnostic::from(e)],
        })
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let config = ProviderConfig::from_value(config)?;
        let clients = match &self.injected {
            Some(clients) => clients.clone(),
            None => ApiClients::from_config(&config)?,
        };

        let mut diagnostics = Vec::new();
        if clients.notification_channels.is_none() && clients.group_mappings.is_none() {
            diagnostics.push(Diagnostic::warning(
                "No Sysdig API token configured; only data sources are available",
            ));
        }

        info!(
            secure_url = %config.secure.url,
            monitor_url = %config.monitor.url,
            timeout = ?config.timeout,
            "Configured Sysdig provider"
        );
        *self.state.write().await = Some(Configured { config, clients });
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        if self.state.write().await.take().is_some() {
            info!("Released Sysdig API clients");
        }
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        match resource_type {
            SLACK_CHANNEL_RESOURCE => Ok(SlackNotificationChannelResource::validate(config)),
            GROUP_MAPPING_RESOURCE => Ok(GroupMappingResource::validate(config)),
            other => Err(unknown_resource(other)),
        }
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        match resource_type {
            SLACK_CHANNEL_RESOURCE => {
                let slack = self.slack().await?;
                self.with_deadline("create", slack.create(planned_state)).await
            },
            GROUP_MAPPING_RESOURCE => {
                let mapping = self.group_mapping().await?;
                self.with_deadline("create", mapping.create(planned_state)).await
            },
            other => Err(unknown_resource(other)),
        }
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>, ProviderError> {
        let result = match resource_type {
            SLACK_CHANNEL_RESOURCE => {
                let slack = self.slack().await?;
                self.with_deadline("read", slack.read(current_state)).await
            },
            GROUP_MAPPING_RESOURCE => {
                let mapping = self.group_mapping().await?;
                self.with_deadline("read", mapping.read(current_state)).await
            },
            other => Err(unknown_resource(other)),
        }?;
        if result.is_none() {
            warn!(resource_type, "Remote entity no longer exists");
        }
        Ok(result)
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        match resource_type {
            SLACK_CHANNEL_RESOURCE => {
                let slack = self.slack().await?;
                self.with_deadline("update", slack.update(prior_state, planned_state)).await
            },
            GROUP_MAPPING_RESOURCE => {
                let mapping = self.group_mapping().await?;
                self.with_deadline("update", mapping.update(prior_state, planned_state)).await
            },
            other => Err(unknown_resource(other)),
        }
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        match resource_type {
            SLACK_CHANNEL_RESOURCE => {
                let slack = self.slack().await?;
                self.with_deadline("delete", slack.delete(current_state)).await
            },
            GROUP_MAPPING_RESOURCE => {
                let mapping = self.group_mapping().await?;
                self.with_deadline("delete", mapping.delete(current_state)).await
            },
            other => Err(unknown_resource(other)),
        }
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = match resource_type {
            SLACK_CHANNEL_RESOURCE => {
                let slack = self.slack().await?;
                self.with_deadline("import", slack.import(id)).await?
            },
            GROUP_MAPPING_RESOURCE => {
                let mapping = self.group_mapping().await?;
                self.with_deadline("import", mapping.import(id)).await?
            },
            other => return Err(unknown_resource(other)),
        };
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        match data_source_type {
            FARGATE_WORKLOAD_AGENT_DATA_SOURCE => Ok(FargateWorkloadAgentDataSource::validate(config)),
            other => Err(ProviderError::UnknownResource(format!(
                "Unknown data source type: {}",
                other
            ))),
        }
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        match data_source_type {
            FARGATE_WORKLOAD_AGENT_DATA_SOURCE => {
                let source = FargateWorkloadAgentDataSource::new(self.patcher.clone(), self.timeout().await);
                source.read(config).await
            },
            other => Err(ProviderError::UnknownResource(format!(
                "Unknown data source type: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fakes::{InMemoryGroupMappings, InMemoryNotificationChannels};
    use serde_json::json;

    fn provider() -> SysdigProvider {
        SysdigProvider::new().with_clients(ApiClients {
            notification_channels: Some(Arc::new(InMemoryNotificationChannels::default())),
            group_mappings: Some(Arc::new(InMemoryGroupMappings::default())),
        })
    }

    #[test]
    fn test_metadata() {
        let metadata = SysdigProvider::new().metadata();
        assert!(metadata.has_resource("sysdig_secure_notification_channel_slack"));
        assert!(metadata.has_resource("sysdig_group_mapping"));
        assert!(metadata.has_data_source("sysdig_fargate_workload_agent"));
    }

    #[tokio::test]
    async fn test_resources_require_configure() {
        let err = provider()
            .create("sysdig_group_mapping", json!({}))
            .await
            .unwrap_err();
        assert!(err.message().contains("not been configured"));
    }

    #[tokio::test]
    async fn test_missing_token_names_variable() {
        let provider = SysdigProvider::new().with_clients(ApiClients::default());
        let diags = provider
            .configure(json!({"sysdig_secure_url": "https://secure.example.com"}))
            .await
            .unwrap();
        assert_eq!(diags.len(), 1);

        let err = provider
            .read("sysdig_secure_notification_channel_slack", json!({"id": "1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.message().contains("SYSDIG_SECURE_API_TOKEN"));
    }

    #[tokio::test]
    async fn test_unknown_types() {
        let provider = provider();
        provider.configure(json!({})).await.unwrap();
        assert!(matches!(
            provider.create("sysdig_nope", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
        assert!(matches!(
            provider.read_data_source("sysdig_nope", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_releases_clients() {
        let provider = provider();
        provider.configure(json!({"timeout_seconds": 10})).await.unwrap();
        assert_eq!(provider.timeout().await, Duration::from_secs(10));

        provider.stop().await.unwrap();
        assert_eq!(provider.timeout().await, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_configure_rejects_bad_block() {
        let err = provider()
            .configure(json!({"timeout_seconds": "soon"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }
}
