//! Tracing subscriber setup shared by every binary.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, honouring `RUST_LOG` and falling back
/// to `default_directive` (for example `"info"`).
///
/// # Errors
///
/// Returns an error when a global subscriber is already installed.
pub fn init(default_directive: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing: {e}"))
}
