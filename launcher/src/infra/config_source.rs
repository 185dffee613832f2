//! Piped config sources: local file, inline data, cloud secret managers and
//! a Git repository.
//!
//! Every source implements `ConfigSource`. The CLI picks exactly one and
//! wraps it in [`PipedConfigSource`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::application::ports::{CommandRunner, ConfigSource};

// ── File and inline ───────────────────────────────────────────────────────────

/// Reads the config from a local path on every load.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
}

impl ConfigSource for FileSource {
    async fn load(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read config file {}", self.path.display()))
    }
}

/// Base64 encoded config passed on the command line.
#[derive(Debug, Clone)]
pub struct InlineSource {
    pub data: String,
}

impl ConfigSource for InlineSource {
    async fn load(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.data.trim())
            .context("config-data is not valid base64")
    }
}

// ── AWS Secrets Manager ───────────────────────────────────────────────────────

/// Reads a base64 encoded secret string from AWS Secrets Manager, using the
/// default credential chain.
#[derive(Debug, Clone)]
pub struct AwsSecretSource {
    pub secret_id: String,
}

impl ConfigSource for AwsSecretSource {
    async fn load(&self) -> Result<Vec<u8>> {
        let sdk = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_secretsmanager::Client::new(&sdk);
        let out = client
            .get_secret_value()
            .secret_id(&self.secret_id)
            .send()
            .await
            .with_context(|| format!("failed to get secret {} from AWS", self.secret_id))?;
        let secret = out
            .secret_string()
            .with_context(|| format!("AWS secret {} has no secret string", self.secret_id))?;
        STANDARD
            .decode(secret.trim())
            .with_context(|| format!("AWS secret {} is not valid base64", self.secret_id))
    }
}

// ── GCP Secret Manager ────────────────────────────────────────────────────────

const GCP_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const GCP_SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com/v1";

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Deserialize)]
struct AccessSecretVersion {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

/// Reads a secret version from GCP Secret Manager with the token of the
/// instance service account.
///
/// `secret_id` is the full version name, for instance
/// `projects/p/secrets/piped-config/versions/latest`.
#[derive(Debug, Clone)]
pub struct GcpSecretSource {
    pub client: reqwest::Client,
    pub secret_id: String,
}

impl GcpSecretSource {
    async fn access_token(&self) -> Result<String> {
        let resp = self
            .client
            .get(GCP_METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context("failed to reach the GCP metadata server")?
            .error_for_status()
            .context("GCP metadata server refused the token request")?;
        let token: MetadataToken = resp.json().await.context("decoding GCP access token")?;
        Ok(token.access_token)
    }
}

impl ConfigSource for GcpSecretSource {
    async fn load(&self) -> Result<Vec<u8>> {
        let token = self.access_token().await?;
        let url = format!("{GCP_SECRET_MANAGER_URL}/{}:access", self.secret_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("failed to access secret {}", self.secret_id))?
            .error_for_status()
            .with_context(|| format!("GCP refused access to secret {}", self.secret_id))?;
        let secret: AccessSecretVersion =
            resp.json().await.context("decoding GCP secret payload")?;
        STANDARD
            .decode(secret.payload.data)
            .with_context(|| format!("GCP secret {} payload is not valid base64", self.secret_id))
    }
}

// ── Git repository ────────────────────────────────────────────────────────────

/// Where the config lives inside a Git repository.
#[derive(Debug, Clone)]
pub struct GitRepoConfig {
    pub url: String,
    pub branch: String,
    /// Path of the config relative to the repository root.
    pub config_file: String,
    pub ssh_key_file: Option<PathBuf>,
}

/// Clones the repository on the first load and pulls it on later ones.
pub struct GitRepoSource<R> {
    runner: R,
    repo: GitRepoConfig,
    checkout: Mutex<Option<TempDir>>,
}

impl<R> GitRepoSource<R> {
    #[must_use]
    pub fn new(runner: R, repo: GitRepoConfig) -> Self {
        Self {
            runner,
            repo,
            checkout: Mutex::new(None),
        }
    }
}

impl<R: CommandRunner> GitRepoSource<R> {
    fn ssh_command(&self) -> Option<String> {
        self.repo.ssh_key_file.as_ref().map(|key| {
            format!(
                "ssh -i {} -o StrictHostKeyChecking=no -F /dev/null",
                key.display()
            )
        })
    }

    async fn git(&self, args: &[&str]) -> Result<()> {
        let ssh = self.ssh_command();
        let envs: Vec<(&str, &str)> = ssh
            .as_deref()
            .map(|cmd| vec![("GIT_SSH_COMMAND", cmd)])
            .unwrap_or_default();
        let out = self.runner.run_with_env("git", args, &envs).await?;
        anyhow::ensure!(
            out.status.success(),
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            String::from_utf8_lossy(&out.stderr).trim()
        );
        Ok(())
    }
}

impl<R: CommandRunner> ConfigSource for GitRepoSource<R> {
    async fn load(&self) -> Result<Vec<u8>> {
        let mut checkout = self.checkout.lock().await;
        if let Some(dir) = checkout.as_ref() {
            let path = dir.path().display().to_string();
            self.git(&["-C", &path, "pull", "origin", &self.repo.branch])
                .await
                .with_context(|| format!("failed to pull {}", self.repo.url))?;
        } else {
            let dir = tempfile::Builder::new()
                .prefix("piped-config-repo")
                .tempdir()
                .context("failed to create a directory for the config repository")?;
            let path = dir.path().display().to_string();
            self.git(&[
                "clone",
                "--branch",
                &self.repo.branch,
                "--single-branch",
                &self.repo.url,
                &path,
            ])
            .await
            .with_context(|| format!("failed to clone {}", self.repo.url))?;
            tracing::info!(url = %self.repo.url, branch = %self.repo.branch, "cloned config repository");
            *checkout = Some(dir);
        }

        let dir = checkout.as_ref().context("config repository is not cloned")?;
        let file = dir.path().join(&self.repo.config_file);
        tokio::fs::read(&file)
            .await
            .with_context(|| format!("failed to read config file {}", file.display()))
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// The source selected on the command line.
pub enum PipedConfigSource<R> {
    File(FileSource),
    Inline(InlineSource),
    Aws(AwsSecretSource),
    Gcp(GcpSecretSource),
    Git(GitRepoSource<R>),
}

impl<R: CommandRunner> ConfigSource for PipedConfigSource<R> {
    async fn load(&self) -> Result<Vec<u8>> {
        match self {
            Self::File(s) => s.load().await,
            Self::Inline(s) => s.load().await,
            Self::Aws(s) => s.load().await,
            Self::Gcp(s) => s.load().await,
            Self::Git(s) => s.load().await,
        }
    }
}
