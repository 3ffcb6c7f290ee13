//! Edits applied after the patcher has run.

use tracing::debug;

use super::model::ContainerDefinition;
use super::options::PatchOptions;
use crate::error::ProviderError;

/// Environment variable that selects the process wrapper.
pub const INSTRUMENTATION_WRAPPER_ENV: &str = "__INSTRUMENTATION_WRAPPER";

/// Bare pdig wrapper command line.
pub const BARE_PDIG_WRAPPER: &str = "/opt/draios/bin/pdig,-C,-t,-1";

/// Apply the post-patch edits to a JSON-encoded container list.
///
/// Returns `patched` untouched when there is nothing to edit. The bare pdig
/// override is appended on every call, so the input must not already have
/// been through this step.
pub fn apply_to_json(patched: &str, options: &PatchOptions) -> Result<String, ProviderError> {
    if options.is_noop() {
        return Ok(patched.to_string());
    }

    let mut containers: Vec<ContainerDefinition> = serde_json::from_str(patched)?;
    apply(&mut containers, options)?;
    Ok(serde_json::to_string(&containers)?)
}

/// Apply the post-patch edits in place.
pub fn apply(
    containers: &mut [ContainerDefinition],
    options: &PatchOptions,
) -> Result<(), ProviderError> {
    // Validate before touching anything so a bad block never half-applies.
    let log_driver = options
        .log_configuration
        .as_ref()
        .map(|log| log.to_log_driver_block())
        .transpose()?;

    for container in containers.iter_mut() {
        let Some(name) = container.name().map(str::to_owned) else {
            continue;
        };

        if container.is_sidecar() {
            if let Some(block) = &log_driver {
                debug!(container = %name, "Attaching awslogs configuration");
                container.set_log_configuration(block.clone());
            }
        } else if options.wants_bare_pdig(&name) {
            debug!(container = %name, "Enabling bare pdig wrapper");
            container.append_environment(INSTRUMENTATION_WRAPPER_ENV, BARE_PDIG_WRAPPER);
        }
    }

    Ok(())
}
