//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::domain::ControlPlaneEndpoint;
use crate::domain::oci::{Descriptor, OciReference};

pub use pipecd_common::CommandRunner;

// ── Desired state ports ───────────────────────────────────────────────────────

/// One place the piped config can be loaded from.
#[allow(async_fn_in_trait)]
pub trait ConfigSource {
    /// Fetch the current config bytes.
    async fn load(&self) -> Result<Vec<u8>>;
}

/// The control plane API used by the launcher.
#[allow(async_fn_in_trait)]
pub trait ControlPlane {
    /// The piped version the control plane wants. Empty means no preference.
    async fn desired_version(&self, endpoint: &ControlPlaneEndpoint) -> Result<String>;
}

// ── Binary ports ──────────────────────────────────────────────────────────────

/// Fetches piped binaries.
#[allow(async_fn_in_trait)]
pub trait BinaryDownloader {
    /// Download `url` to `dest_dir/file_name`, mark it executable and return
    /// its path. An existing destination is returned untouched.
    async fn download(&self, url: &str, dest_dir: &Path, file_name: &str) -> Result<PathBuf>;
}

// ── Process ports ─────────────────────────────────────────────────────────────

/// Starts piped processes.
#[allow(async_fn_in_trait)]
pub trait Supervisor {
    type Run: AgentRun;

    /// Start `path` with `args`, sharing the launcher's stdio.
    async fn start(&self, path: &Path, args: &[String]) -> Result<Self::Run>;
}

/// A started piped process.
#[allow(async_fn_in_trait)]
pub trait AgentRun {
    /// `true` until the process has exited.
    fn is_running(&self) -> bool;

    /// Ask the process to terminate, kill it once `period` has elapsed and
    /// wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns the exit failure when the process stopped within the period
    /// with a non-success status.
    async fn graceful_stop(self, period: Duration) -> Result<()>;
}

// ── Filesystem port ───────────────────────────────────────────────────────────

/// The working directory operations of the launcher loop.
#[allow(async_fn_in_trait)]
pub trait LocalFs {
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;
    async fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// Remove `path` recursively. A missing path is not an error.
    async fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

// ── Registry port ─────────────────────────────────────────────────────────────

/// Content access to one OCI registry.
#[allow(async_fn_in_trait)]
pub trait OciRegistry {
    /// Fetch a manifest or index by tag or digest. Returns the media type
    /// announced by the registry and the raw document.
    async fn fetch_manifest(&self, repo: &OciReference, reference: &str) -> Result<(String, Vec<u8>)>;
    /// Fetch a blob by digest.
    async fn fetch_blob(&self, repo: &OciReference, digest: &str) -> Result<Vec<u8>>;
    /// Upload a blob unless the registry already has it.
    async fn push_blob(&self, repo: &OciReference, descriptor: &Descriptor, data: &[u8]) -> Result<()>;
    /// Upload a manifest or index under `reference`.
    async fn push_manifest(
        &self,
        repo: &OciReference,
        reference: &str,
        media_type: &str,
        data: &[u8],
    ) -> Result<()>;
}
