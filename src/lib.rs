//! Hemmer provider for Sysdig Monitor and Sysdig Secure.
//!
//! # Overview
//!
//! The provider serves:
//!
//! - **`sysdig_fargate_workload_agent`** (data source): instruments a Fargate
//!   task's container definitions with the Sysdig workload agent. See [`kilt`].
//! - **`sysdig_secure_notification_channel_slack`** (resource): a Sysdig
//!   Secure notification channel posting to Slack.
//! - **`sysdig_group_mapping`** (resource): maps an identity provider group
//!   to Sysdig roles and teams.
//!
//! [`SysdigProvider`] implements the [`ProviderService`] lifecycle contract.
//! [`ProviderServer`] wraps it and reports every outcome as [`Diagnostic`]s.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_provider_sysdig::{init_logging, ProviderServer, SysdigProvider};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     init_logging();
//!
//!     let server = ProviderServer::new(SysdigProvider::new());
//!     server.configure(json!({"sysdig_secure_url": "https://eu1.app.sysdig.com"})).await;
//!
//!     let response = server
//!         .read_data_source("sysdig_fargate_workload_agent", json!({
//!             "container_definitions": r#"[{"name":"app","image":"nginx"}]"#,
//!             "workload_agent_image": "quay.io/sysdig/workload-agent:latest",
//!         }))
//!         .await;
//!     println!("{:?}", response.value);
//! }
//! ```
//!
//! # Configuration
//!
//! Provider attributes fall back to `SYSDIG_SECURE_URL`,
//! `SYSDIG_SECURE_API_TOKEN`, `SYSDIG_SECURE_INSECURE_TLS`,
//! `SYSDIG_MONITOR_URL`, `SYSDIG_MONITOR_API_TOKEN` and
//! `SYSDIG_MONITOR_INSECURE_TLS`. See [`config`].

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod data_sources;
pub mod diagnostics;
pub mod digest;
pub mod error;
pub mod kilt;
pub mod logging;
pub mod provider;
pub mod resources;
pub mod server;
pub mod testing;
pub mod types;

// Re-export main types at crate root
pub use config::ProviderConfig;
pub use diagnostics::{Diagnostic, DiagnosticSeverity};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{ApiClients, SysdigProvider};
pub use server::{ProviderServer, ProviderService, Response};
pub use types::{ImportedResource, ProviderMetadata};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
