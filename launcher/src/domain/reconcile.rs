//! Relaunch rules of the launcher loop.

use std::fmt;

/// The version and config piped should run with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub version: String,
    pub config: Vec<u8>,
}

/// What the current tick should do with the running piped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relaunch {
    /// Running piped matches the desired state.
    UpToDate,
    /// Version or config drifted.
    Changed,
    /// Nothing running, or the child exited on its own.
    NotRunning,
}

impl Relaunch {
    #[must_use]
    pub fn decide(running: Option<&DesiredState>, desired: &DesiredState, alive: bool) -> Self {
        match running {
            Some(current) if current != desired => Self::Changed,
            Some(_) if alive => Self::UpToDate,
            _ => Self::NotRunning,
        }
    }
}

/// Pick the version to run when the control plane answers `desired`.
///
/// An empty answer falls back to `default_version`, then to the launcher's
/// own version.
#[must_use]
pub fn resolve_version(desired: &str, default_version: &str, launcher_version: &str) -> String {
    [desired, default_version, launcher_version]
        .into_iter()
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Control plane address and piped credentials. Two equal endpoints can
/// share one client.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlPlaneEndpoint {
    pub address: String,
    pub project_id: String,
    pub piped_id: String,
    pub piped_key: Vec<u8>,
}

impl ControlPlaneEndpoint {
    /// Token sent as `PIPED-TOKEN <project>,<piped id>,<piped key>`.
    #[must_use]
    pub fn token(&self) -> String {
        format!(
            "{},{},{}",
            self.project_id,
            self.piped_id,
            String::from_utf8_lossy(&self.piped_key).trim()
        )
    }
}

impl fmt::Debug for ControlPlaneEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlaneEndpoint")
            .field("address", &self.address)
            .field("project_id", &self.project_id)
            .field("piped_id", &self.piped_id)
            .field("piped_key", &"<redacted>")
            .finish()
    }
}
