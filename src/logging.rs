//! Logging setup for the Sysdig provider.
//!
//! Logs go to **stderr**; stdout belongs to the host handshake. Filtering
//! follows `RUST_LOG` and falls back to the level given by the caller.
//!
//! ```bash
//! # Trace every Sysdig API request and response line
//! RUST_LOG=hemmer_provider_sysdig::client=debug ./hemmer-provider-sysdig
//!
//! # Follow the container definition patch pipeline
//! RUST_LOG=hemmer_provider_sysdig::kilt=debug ./hemmer-provider-sysdig
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the global subscriber at [`DEFAULT_LOG_LEVEL`].
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default(DEFAULT_LOG_LEVEL);
}

/// Install the global subscriber, using `default_level` when `RUST_LOG` is
/// unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Install the global subscriber unless one is already set.
///
/// Returns `false` if a subscriber was already installed, which makes it safe
/// to call from every test.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter(DEFAULT_LOG_LEVEL))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_sysdig=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_sysdig::kilt=trace").is_ok());
    }

    #[test]
    fn test_try_init_is_idempotent() {
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
