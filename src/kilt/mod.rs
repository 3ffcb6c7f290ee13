//! Fargate task definition instrumentation.
//!
//! The pipeline runs in four steps, each in its own module:
//!
//! 1. [`options`]: resolve the user's instrumentation options.
//! 2. [`stack`]: wrap the container definitions in the stack document the
//!    patcher expects, tagging the ignore list.
//! 3. [`patcher`]: run the patcher behind a panic barrier and unwrap its
//!    output.
//! 4. [`postprocess`]: attach the sidecar's awslogs configuration and the
//!    bare pdig overrides.
//!
//! [`recipe::RecipePatcher`] is the patcher used by default.

pub mod config;
pub mod model;
pub mod options;
pub mod patcher;
pub mod postprocess;
pub mod recipe;
pub mod stack;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument};

pub use config::{KiltConfiguration, RecipeConfig};
pub use model::{ContainerDefinition, SIDECAR_CONTAINER_NAME};
pub use options::{LogConfiguration, PatchOptions};
pub use patcher::StackPatcher;
pub use recipe::RecipePatcher;
pub use stack::WrappedStackDocument;

use crate::error::ProviderError;

/// Instrument a JSON array of container definitions.
///
/// `cancel` aborts the patcher when it completes first. The returned string is
/// the JSON array of patched container definitions.
#[instrument(skip_all, fields(bytes = container_definitions.len()))]
pub async fn patch_fargate_task_definition<F>(
    patcher: Arc<dyn StackPatcher>,
    container_definitions: &str,
    config: &KiltConfiguration,
    options: &PatchOptions,
    cancel: F,
) -> Result<String, ProviderError>
where
    F: Future<Output = ()>,
{
    let document = WrappedStackDocument::from_container_definitions(container_definitions, options)?;
    let containers = patcher::invoke(patcher, config, &document, cancel).await?;
    debug!(containers = containers.len(), "Patcher returned");

    let patched = serde_json::to_string(&containers)?;
    postprocess::apply_to_json(&patched, options)
}
