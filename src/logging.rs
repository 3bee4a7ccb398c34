//! Logging setup
//!
//! Installs a `tracing` subscriber for hosts that don't bring their own.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "uniterra_runtime=info";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `uniterra_runtime=info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already installed");
    }
}
