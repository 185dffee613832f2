//! On-demand installation of kubectl, kustomize and helm.
//!
//! Binaries live flat in one directory. The default version of a tool is
//! installed as `<tool>`, any other version as `<tool>-<version>`.

use std::collections::{HashMap, HashSet};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::application::ports::{CommandRunner, ToolRegistry};
use crate::domain::error::KubernetesError;

pub const DEFAULT_KUBECTL_VERSION: &str = "1.18.2";
pub const DEFAULT_KUSTOMIZE_VERSION: &str = "3.8.1";
pub const DEFAULT_HELM_VERSION: &str = "3.8.2";

const KUBECTL_INSTALL_SCRIPT: &str = "\
cd {working_dir}
curl -fsSLO https://dl.k8s.io/release/v{version}/bin/{os}/{arch}/kubectl
mv kubectl {bin_dir}/{bin_name}
";

const KUSTOMIZE_INSTALL_SCRIPT: &str = "\
cd {working_dir}
curl -fsSL https://github.com/kubernetes-sigs/kustomize/releases/download/kustomize%2Fv{version}/kustomize_v{version}_{os}_{arch}.tar.gz | tar xz
mv kustomize {bin_dir}/{bin_name}
";

const HELM_INSTALL_SCRIPT: &str = "\
cd {working_dir}
curl -fsSL https://get.helm.sh/helm-v{version}-{os}-{arch}.tar.gz | tar xz
mv {os}-{arch}/helm {bin_dir}/{bin_name}
";

/// Installs tools into `bin_dir` by running shell scripts.
///
/// Concurrent requests for the same binary share one install. A failed
/// install is not remembered, so the next request tries again.
pub struct BinToolRegistry<R> {
    bin_dir: PathBuf,
    runner: R,
    installed: RwLock<HashSet<String>>,
    inflight: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl<R: CommandRunner> BinToolRegistry<R> {
    /// Create `bin_dir` if needed and record the binaries already in it.
    pub async fn new(bin_dir: impl Into<PathBuf>, runner: R) -> Result<Self> {
        let bin_dir = bin_dir.into();
        tokio::fs::create_dir_all(&bin_dir)
            .await
            .with_context(|| format!("creating {}", bin_dir.display()))?;
        let installed = scan_installed(&bin_dir).await?;
        tracing::debug!(dir = %bin_dir.display(), count = installed.len(), "scanned pre-installed tools");
        Ok(Self {
            bin_dir,
            runner,
            installed: RwLock::new(installed),
            inflight: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Path of `name` at `version`, running `script` first unless the
    /// binary is already present.
    ///
    /// `script` may use `{working_dir}`, `{version}`, `{bin_dir}`,
    /// `{bin_name}`, `{os}` and `{arch}`.
    pub async fn install(&self, name: &str, version: &str, script: &str) -> Result<PathBuf> {
        self.install_as(name, version, &binary_name(name, version), script)
            .await
    }

    async fn install_as(
        &self,
        tool: &str,
        version: &str,
        bin_name: &str,
        script: &str,
    ) -> Result<PathBuf> {
        let path = self.bin_dir.join(bin_name);
        if self.installed.read().await.contains(bin_name) {
            return Ok(path);
        }

        let cell = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(inflight.entry(bin_name.to_string()).or_default())
        };
        cell.get_or_try_init(|| self.run_install(tool, version, bin_name, script))
            .await?;
        Ok(path)
    }

    async fn run_install(&self, tool: &str, version: &str, bin_name: &str, script: &str) -> Result<()> {
        // Another request may have finished between the fast path and here.
        if self.installed.read().await.contains(bin_name) {
            return Ok(());
        }

        let workdir = tempfile::Builder::new()
            .prefix("tool-install-")
            .tempdir()
            .context("creating install working directory")?;
        let rendered = render_script(script, workdir.path(), &self.bin_dir, bin_name, version);

        tracing::info!(tool, version, "installing tool");
        let out = self
            .runner
            .run_in_dir(workdir.path(), "/bin/sh", &["-c", &rendered])
            .await?;
        if !out.status.success() {
            let output = format!(
                "{}{}",
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            );
            tracing::error!(tool, version, script = %rendered, output = %output, "failed to install tool");
            return Err(KubernetesError::ToolInstall {
                tool: tool.to_string(),
                version: version.to_string(),
                reason: output.trim().to_string(),
            }
            .into());
        }

        let path = self.bin_dir.join(bin_name);
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .await
            .with_context(|| format!("making {} executable", path.display()))?;
        self.installed.write().await.insert(bin_name.to_string());
        tracing::info!(tool, version, path = %path.display(), "just installed {bin_name}");
        Ok(())
    }

    async fn install_tool(
        &self,
        tool: &str,
        version: &str,
        default_version: &str,
        script: &str,
    ) -> Result<PathBuf> {
        if version.is_empty() {
            self.install_as(tool, default_version, tool, script).await
        } else {
            self.install_as(tool, version, &binary_name(tool, version), script)
                .await
        }
    }
}

impl<R: CommandRunner> ToolRegistry for BinToolRegistry<R> {
    async fn kubectl(&self, version: &str) -> Result<PathBuf> {
        self.install_tool("kubectl", version, DEFAULT_KUBECTL_VERSION, KUBECTL_INSTALL_SCRIPT)
            .await
    }

    async fn kustomize(&self, version: &str) -> Result<PathBuf> {
        self.install_tool(
            "kustomize",
            version,
            DEFAULT_KUSTOMIZE_VERSION,
            KUSTOMIZE_INSTALL_SCRIPT,
        )
        .await
    }

    async fn helm(&self, version: &str) -> Result<PathBuf> {
        self.install_tool("helm", version, DEFAULT_HELM_VERSION, HELM_INSTALL_SCRIPT)
            .await
    }
}

/// `kubectl` for an empty version, `kubectl-1.30.0` otherwise.
#[must_use]
pub fn binary_name(tool: &str, version: &str) -> String {
    if version.is_empty() {
        tool.to_string()
    } else {
        format!("{tool}-{version}")
    }
}

fn render_script(
    script: &str,
    working_dir: &Path,
    bin_dir: &Path,
    bin_name: &str,
    version: &str,
) -> String {
    script
        .replace("{working_dir}", &working_dir.to_string_lossy())
        .replace("{bin_dir}", &bin_dir.to_string_lossy())
        .replace("{bin_name}", bin_name)
        .replace("{version}", version)
        .replace("{os}", target_os())
        .replace("{arch}", target_arch())
}

fn target_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn target_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

async fn scan_installed(bin_dir: &Path) -> Result<HashSet<String>> {
    let mut installed = HashSet::new();
    let mut entries = tokio::fs::read_dir(bin_dir)
        .await
        .with_context(|| format!("reading {}", bin_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            installed.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(installed)
}
