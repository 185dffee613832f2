//! Application service: fetch the version and config piped should run with.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{ConfigSource, ControlPlane, LocalFs};
use crate::domain::reconcile::resolve_version;
use crate::domain::{ControlPlaneEndpoint, DesiredState, LauncherError, LauncherSpec, PipedKeySource};

/// Upper bound for one `GetDesiredVersion` round trip, connection included.
pub const DESIRED_VERSION_TIMEOUT: Duration = Duration::from_secs(15);

/// Load the config, then ask the control plane which version to run.
///
/// An empty answer falls back to `default_version`, then to
/// `launcher_version`.
///
/// # Errors
///
/// Returns [`LauncherError::ConfigLoad`] when the source fails,
/// [`LauncherError::InvalidConfig`] for a malformed config or unreadable
/// key, and [`LauncherError::DesiredVersion`] when the control plane call
/// fails or times out.
pub async fn fetch_desired_state(
    source: &impl ConfigSource,
    control_plane: &impl ControlPlane,
    fs: &impl LocalFs,
    default_version: &str,
    launcher_version: &str,
) -> Result<DesiredState> {
    let config = source
        .load()
        .await
        .map_err(|e| LauncherError::ConfigLoad(format!("{e:#}")))?;
    let spec = LauncherSpec::parse(&config)?;
    let endpoint = ControlPlaneEndpoint {
        piped_key: load_piped_key(fs, &spec).await?,
        address: spec.api_address,
        project_id: spec.project_id,
        piped_id: spec.piped_id,
    };

    let answer = tokio::time::timeout(
        DESIRED_VERSION_TIMEOUT,
        control_plane.desired_version(&endpoint),
    )
    .await
    .map_err(|_| LauncherError::DesiredVersion {
        address: endpoint.address.clone(),
        reason: format!("no answer within {DESIRED_VERSION_TIMEOUT:?}"),
    })?
    .map_err(|e| LauncherError::DesiredVersion {
        address: endpoint.address.clone(),
        reason: format!("{e:#}"),
    })?;

    let version = resolve_version(&answer, default_version, launcher_version);
    tracing::debug!(%version, answer = %answer, "resolved desired piped version");
    Ok(DesiredState { version, config })
}

async fn load_piped_key(fs: &impl LocalFs, spec: &LauncherSpec) -> Result<Vec<u8>> {
    match spec.piped_key_source()? {
        PipedKeySource::Inline(key) => Ok(key),
        PipedKeySource::File(path) => fs
            .read(Path::new(&path))
            .await
            .with_context(|| format!("failed to read piped key file {path}"))
            .map_err(|e| LauncherError::InvalidConfig(format!("{e:#}")).into()),
    }
}
