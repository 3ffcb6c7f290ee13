//! The provider lifecycle contract and its diagnostic boundary.
//!
//! [`ProviderService`] is what a provider implements. [`ProviderServer`]
//! sits between the host and the service: it turns every
//! [`ProviderError`] into [`Diagnostic`]s and logs each call's outcome.
//! Errors are converted there and nowhere else.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::diagnostics::{has_errors, Diagnostic};
use crate::error::ProviderError;
use crate::types::{ImportedResource, ProviderMetadata};

/// Trait that provider implementations must implement.
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_sysdig::{ProviderService, ProviderError, ProviderMetadata, Diagnostic};
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl ProviderService for MyProvider {
///     fn metadata(&self) -> ProviderMetadata {
///         ProviderMetadata::new(["example_resource"], [])
///     }
///
///     async fn configure(&self, config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Metadata
    // =========================================================================

    /// Resource and data source types served by this provider.
    fn metadata(&self) -> ProviderMetadata;

    /// Convert a failed call on `type_name` into a diagnostic.
    fn diagnose(&self, type_name: &str, err: ProviderError) -> Diagnostic {
        let _ = type_name;
        Diagnostic::from(err)
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Create a new resource and return its state.
    async fn create(&self, resource_type: &str, planned_state: Value)
        -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    ///
    /// Returns `None` when the remote entity no longer exists; the host then
    /// forgets the resource.
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource. Deleting an already absent resource succeeds.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "Unknown data source type: {}",
            data_source_type
        )))
    }
}

/// Outcome of one lifecycle call as handed back to the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response<T> {
    /// The call's result; `None` on failure or when a read found nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    /// Errors and warnings.
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Response<T> {
    fn ok(value: Option<T>) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
        }
    }

    fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            value: None,
            diagnostics: vec![diagnostic],
        }
    }

    /// Whether the call produced an error diagnostic.
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

/// Wraps a [`ProviderService`] and converts its results into [`Response`]s.
pub struct ProviderServer<P: ProviderService> {
    provider: Arc<P>,
}

impl<P: ProviderService> Clone for ProviderServer<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
        }
    }
}

impl<P: ProviderService> ProviderServer<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn diagnostics_outcome(
        &self,
        operation: &str,
        type_name: &str,
        result: Result<Vec<Diagnostic>, ProviderError>,
    ) -> Vec<Diagnostic> {
        match result {
            Ok(diagnostics) => {
                if has_errors(&diagnostics) {
                    warn!(operation, type_name, diagnostics = diagnostics.len(), "Completed with errors");
                } else {
                    info!(operation, type_name, "Completed successfully");
                }
                diagnostics
            },
            Err(e) => {
                error!(operation, type_name, error = %e, "Failed");
                vec![self.provider.diagnose(type_name, e)]
            },
        }
    }

    fn value_outcome<T>(
        &self,
        operation: &str,
        type_name: &str,
        result: Result<Option<T>, ProviderError>,
    ) -> Response<T> {
        match result {
            Ok(value) => {
                info!(operation, type_name, found = value.is_some(), "Completed successfully");
                Response::ok(value)
            },
            Err(e) => {
                error!(operation, type_name, error = %e, "Failed");
                Response::failed(self.provider.diagnose(type_name, e))
            },
        }
    }

    pub fn metadata(&self) -> ProviderMetadata {
        let metadata = self.provider.metadata();
        debug!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "GetMetadata completed"
        );
        metadata
    }

    #[instrument(skip_all, name = "provider.validate_provider_config")]
    pub async fn validate_provider_config(&self, config: Value) -> Vec<Diagnostic> {
        let result = self.provider.validate_provider_config(config).await;
        self.diagnostics_outcome("validate_provider_config", "provider", result)
    }

    #[instrument(skip_all, name = "provider.configure")]
    pub async fn configure(&self, config: Value) -> Vec<Diagnostic> {
        let result = self.provider.configure(config).await;
        self.diagnostics_outcome("configure", "provider", result)
    }

    #[instrument(skip_all, name = "provider.stop")]
    pub async fn stop(&self) -> Option<String> {
        match self.provider.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                None
            },
            Err(e) => {
                error!(error = %e, "Stop failed");
                Some(e.to_string())
            },
        }
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    pub async fn validate_resource_config(&self, resource_type: &str, config: Value) -> Vec<Diagnostic> {
        let result = self.provider.validate_resource_config(resource_type, config).await;
        self.diagnostics_outcome("validate_resource_config", resource_type, result)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Response<Value> {
        let result = self.provider.create(resource_type, planned_state).await.map(Some);
        self.value_outcome("create", resource_type, result)
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Response<Value> {
        let result = self.provider.read(resource_type, current_state).await;
        self.value_outcome("read", resource_type, result)
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Response<Value> {
        let result = self
            .provider
            .update(resource_type, prior_state, planned_state)
            .await
            .map(Some);
        self.value_outcome("update", resource_type, result)
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Vec<Diagnostic> {
        let result = self
            .provider
            .delete(resource_type, current_state)
            .await
            .map(|()| Vec::new());
        self.diagnostics_outcome("delete", resource_type, result)
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    pub async fn import_resource(&self, resource_type: &str, id: &str) -> Response<Vec<ImportedResource>> {
        let result = self.provider.import_resource(resource_type, id).await.map(Some);
        self.value_outcome("import_resource", resource_type, result)
    }

    #[instrument(skip(self, config), name = "provider.validate_data_source_config")]
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Vec<Diagnostic> {
        let result = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await;
        self.diagnostics_outcome("validate_data_source_config", data_source_type, result)
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> Response<Value> {
        let result = self
            .provider
            .read_data_source(data_source_type, config)
            .await
            .map(Some);
        self.value_outcome("read_data_source", data_source_type, result)
    }
}
