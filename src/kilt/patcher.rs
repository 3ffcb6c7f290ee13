//! Invocation of the external container definition patcher.
//!
//! The patcher is third-party code. It runs on its own task so that a panic
//! inside it surfaces as [`ProviderError::PatchFailed`] instead of unwinding
//! through the provider.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::config::KiltConfiguration;
use super::model::ContainerDefinition;
use super::stack::WrappedStackDocument;
use crate::error::ProviderError;

/// Fallback message for panics whose payload is not a string or error.
pub const UNKNOWN_PANIC: &str = "unknown panic";

/// A routine that rewrites a serialized stack document.
#[async_trait]
pub trait StackPatcher: Send + Sync + 'static {
    /// Patch `stack` according to `config`, returning the new document.
    async fn patch(
        &self,
        config: &KiltConfiguration,
        stack: Vec<u8>,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Run the patcher over `document` and return the patched container list.
///
/// Resolves with [`ProviderError::Cancelled`] as soon as `cancel` completes.
pub async fn invoke<F>(
    patcher: Arc<dyn StackPatcher>,
    config: &KiltConfiguration,
    document: &WrappedStackDocument,
    cancel: F,
) -> Result<Vec<ContainerDefinition>, ProviderError>
where
    F: Future<Output = ()>,
{
    let stack = serde_json::to_vec(document)?;
    let config = config.clone();
    debug!(bytes = stack.len(), "Invoking stack patcher");

    let mut task = tokio::spawn(async move { patcher.patch(&config, stack).await });
    let abort = task.abort_handle();

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = cancel => {
            abort.abort();
            warn!("Stack patcher cancelled");
            return Err(ProviderError::Cancelled(
                "container definition patch was cancelled".to_string(),
            ));
        }
    };

    let patched = match joined {
        Ok(result) => result?,
        Err(err) if err.is_panic() => {
            let message = panic_message(err.into_panic());
            warn!(panic = %message, "Stack patcher panicked");
            return Err(ProviderError::PatchFailed(message));
        },
        Err(err) => return Err(ProviderError::PatchFailed(err.to_string())),
    };

    let stack: WrappedStackDocument = serde_json::from_slice(&patched)?;
    stack.into_container_definitions()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = payload.downcast_ref::<ProviderError>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<Box<dyn std::error::Error + Send + Sync>>() {
        err.to_string()
    } else {
        UNKNOWN_PANIC.to_string()
    }
}
