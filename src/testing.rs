//! Test harness for the Sysdig provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] directly, without a host,
//! and turns error diagnostics into [`TestError`]s. [`fakes`] holds in-memory
//! Sysdig APIs to plug in through [`crate::ApiClients`].
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_sysdig::testing::ProviderTester;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_group_mapping() {
//!     let tester = ProviderTester::new(provider_with_fakes());
//!     tester.configure(json!({})).await.unwrap();
//!
//!     let state = tester
//!         .lifecycle_create("sysdig_group_mapping", json!({
//!             "group_name": "admins",
//!             "role": "ROLE_TEAM_MANAGER",
//!             "team_map": {"all_teams": true}
//!         }))
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(state["group_name"], "admins");
//! }
//! ```

pub mod fakes;

use serde_json::Value;
use thiserror::Error;

use crate::diagnostics::Diagnostic;
use crate::error::ProviderError;
use crate::server::ProviderService;
use crate::types::ImportedResource;

/// Calls a provider the way the host would.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        errors_only(self.provider.validate_provider_config(config).await?)
    }

    /// Configure the provider. Warnings are dropped.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        errors_only(self.provider.configure(config).await?)
    }

    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        errors_only(
            self.provider
                .validate_resource_config(resource_type, config)
                .await?,
        )
    }

    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read a resource; `None` if the remote entity is gone.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        errors_only(
            self.provider
                .validate_data_source_config(data_source_type, config)
                .await?,
        )
    }

    pub async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    /// Validate, create, then read back. Returns the state after the read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, config.clone())
            .await?;
        let created = self.create(resource_type, config).await?;
        self.read_existing(resource_type, created).await
    }

    /// Validate the proposal, update, then read back.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, proposed_state.clone())
            .await?;
        let updated = self
            .update(resource_type, prior_state, proposed_state)
            .await?;
        self.read_existing(resource_type, updated).await
    }

    /// Delete, then expect the read to report the entity gone.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), TestError> {
        self.delete(resource_type, current_state.clone()).await?;
        match self.read(resource_type, current_state).await? {
            None => Ok(()),
            Some(state) => Err(TestError::StillExists(state)),
        }
    }

    /// Create, update with `changes` merged over the created state, delete.
    ///
    /// Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        changes: Value,
    ) -> Result<Value, TestError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let proposed = merge(created.clone(), changes);
        let updated = self
            .lifecycle_update(resource_type, created, proposed)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }

    async fn read_existing(&self, resource_type: &str, state: Value) -> Result<Value, TestError> {
        self.read(resource_type, state)
            .await?
            .ok_or_else(|| TestError::Provider(ProviderError::NotFound(resource_type.to_string())))
    }
}

/// Shallow merge of top-level attributes.
fn merge(mut base: Value, overlay: Value) -> Value {
    match (base.as_object_mut(), overlay) {
        (Some(fields), Value::Object(changes)) => {
            fields.extend(changes);
            base
        },
        (_, overlay) => overlay,
    }
}

/// Failure of a [`ProviderTester`] call.
#[derive(Debug, Error)]
pub enum TestError {
    #[error("{}", render(.0))]
    Diagnostics(Vec<Diagnostic>),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Resource still exists after delete: {0}")]
    StillExists(Value),
}

fn render(diagnostics: &[Diagnostic]) -> String {
    let mut out = format!("{} error diagnostic(s):", diagnostics.len());
    for diag in diagnostics {
        out.push_str("\n  ");
        out.push_str(&diag.summary);
        if let Some(detail) = &diag.detail {
            out.push_str(": ");
            out.push_str(detail);
        }
        if let Some(attribute) = &diag.attribute {
            out.push_str(&format!(" (at {})", attribute));
        }
    }
    out
}

fn errors_only(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn error_summaries(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(|d| d.summary.as_str())
        .collect()
}

/// Panics if any diagnostic is an error.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors = error_summaries(diagnostics);
    assert!(errors.is_empty(), "expected no errors, got {:?}", errors);
}

/// Panics unless some diagnostic is an error.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        diagnostics.iter().any(Diagnostic::is_error),
        "expected at least one error, got none"
    );
}

/// Panics unless an error summary contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let errors = error_summaries(diagnostics);
    assert!(
        errors.iter().any(|s| s.contains(substring)),
        "expected an error containing '{}', got {:?}",
        substring,
        errors
    );
}

/// Panics unless an error is pinned to `attribute`.
pub fn assert_attribute_error(diagnostics: &[Diagnostic], attribute: &str) {
    let found = diagnostics
        .iter()
        .any(|d| d.is_error() && d.attribute.as_deref() == Some(attribute));

    assert!(
        found,
        "expected an error at '{}', got errors at {:?}",
        attribute,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.attribute)
            .collect::<Vec<_>>()
    );
}
