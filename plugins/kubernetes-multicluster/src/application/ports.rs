//! Port trait definitions for the application layer.
//!
//! Services depend on these contracts only; `crate::infra` provides the
//! production implementations and tests provide fakes.

use std::path::PathBuf;

use anyhow::Result;

use crate::domain::manifest::Manifest;
use crate::domain::resource_key::ResourceKey;
use crate::domain::spec::LoaderInput;

pub use pipecd_common::CommandRunner;

// ── Value Types ───────────────────────────────────────────────────────────────

/// A kubectl binary bound to one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub kubectl: PathBuf,
    /// Empty means kubectl's own default resolution.
    pub kubeconfig: String,
}

impl Cluster {
    #[must_use]
    pub fn new(kubectl: impl Into<PathBuf>, kubeconfig: impl Into<String>) -> Self {
        Self {
            kubectl: kubectl.into(),
            kubeconfig: kubeconfig.into(),
        }
    }
}

/// Which objects a `get_all` call lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Namespaced objects in every namespace.
    AllNamespaces,
    /// Namespaced objects in one namespace.
    Namespace(&'a str),
    ClusterScoped,
}

// ── Tooling ───────────────────────────────────────────────────────────────────

/// Resolves external CLI binaries, installing them on first use.
///
/// An empty version selects the tool's default version.
#[allow(async_fn_in_trait)]
pub trait ToolRegistry {
    async fn kubectl(&self, version: &str) -> Result<PathBuf>;
    async fn kustomize(&self, version: &str) -> Result<PathBuf>;
    async fn helm(&self, version: &str) -> Result<PathBuf>;
}

/// Renders the manifests of one application at one commit.
#[allow(async_fn_in_trait)]
pub trait ManifestLoader {
    async fn load_manifests(&self, input: &LoaderInput) -> Result<Vec<Manifest>>;
}

// ── Cluster access ────────────────────────────────────────────────────────────

/// kubectl subcommands used by the engine. An empty `namespace` omits the
/// `--namespace` flag.
///
/// Typed kinds travel inside the returned `anyhow::Error`:
/// `KubernetesError::NotFound` from `replace`, `force_replace`, `delete` and
/// `get`; `KubernetesError::AlreadyExists` from `create` and
/// `create_namespace`.
#[allow(async_fn_in_trait)]
pub trait Kubectl {
    async fn apply(&self, cluster: &Cluster, namespace: &str, manifest: &Manifest) -> Result<()>;
    async fn create(&self, cluster: &Cluster, namespace: &str, manifest: &Manifest)
    -> Result<()>;
    async fn replace(
        &self,
        cluster: &Cluster,
        namespace: &str,
        manifest: &Manifest,
    ) -> Result<()>;
    async fn force_replace(
        &self,
        cluster: &Cluster,
        namespace: &str,
        manifest: &Manifest,
    ) -> Result<()>;
    async fn delete(&self, cluster: &Cluster, namespace: &str, key: &ResourceKey) -> Result<()>;
    async fn get(&self, cluster: &Cluster, namespace: &str, key: &ResourceKey)
    -> Result<Manifest>;
    /// Resource type names that support list, get and delete.
    async fn api_resources(&self, cluster: &Cluster, namespaced: bool) -> Result<Vec<String>>;
    /// Every object of `resources` in `scope` matching `selector`.
    async fn get_all(
        &self,
        cluster: &Cluster,
        scope: Scope<'_>,
        resources: &[String],
        selector: &str,
    ) -> Result<Vec<Manifest>>;
    async fn create_namespace(&self, cluster: &Cluster, namespace: &str) -> Result<()>;
}

// ── Stage logs ────────────────────────────────────────────────────────────────

/// User-facing progress of a running stage.
pub trait StageLogPersister {
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}
