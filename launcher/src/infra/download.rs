//! Binary download: implements `BinaryDownloader` for `http(s)://`,
//! `file://` and `oci://` sources.
//!
//! Data lands in a temporary file next to the destination, which is made
//! executable and renamed into place only after the transfer succeeded.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Url;
use tokio::io::AsyncWriteExt;

use crate::application::ports::{BinaryDownloader, OciRegistry};
use crate::application::services::oci::pull_artifact;
use crate::domain::LauncherError;
use crate::domain::release::{PIPED_MEDIA_TYPE, Platform};

/// Downloads piped binaries for `platform`.
#[derive(Debug)]
pub struct ReleaseDownloader<G> {
    http: reqwest::Client,
    registry: G,
    platform: Platform,
}

impl<G> ReleaseDownloader<G> {
    #[must_use]
    pub fn new(http: reqwest::Client, registry: G, platform: Platform) -> Self {
        Self {
            http,
            registry,
            platform,
        }
    }
}

impl<G: OciRegistry> ReleaseDownloader<G> {
    async fn fetch_http(&self, file: &mut tokio::fs::File, url: &str) -> Result<()> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("HTTP GET {url} failed"))?;
        anyhow::ensure!(
            resp.status().is_success(),
            "HTTP GET {url} failed with status {}",
            resp.status()
        );
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.with_context(|| format!("could not read from {url}"))?;
            file.write_all(&chunk).await.context("could not write download")?;
        }
        Ok(())
    }

    async fn fetch(&self, file: &mut tokio::fs::File, url: &str) -> Result<()> {
        let parsed = Url::parse(url).with_context(|| format!("could not parse URL {url}"))?;
        match parsed.scheme() {
            "http" | "https" => self.fetch_http(file, url).await,
            "file" => {
                let source = parsed
                    .to_file_path()
                    .map_err(|()| anyhow::anyhow!("invalid file URL {url}"))?;
                let data = tokio::fs::read(&source)
                    .await
                    .with_context(|| format!("could not read file {}", source.display()))?;
                file.write_all(&data).await.context("could not write download")
            }
            "oci" => {
                let data = pull_artifact(&self.registry, url, &self.platform, PIPED_MEDIA_TYPE).await?;
                file.write_all(&data).await.context("could not write download")
            }
            other => Err(LauncherError::UnsupportedScheme(other.to_string()).into()),
        }
    }
}

impl<G: OciRegistry> BinaryDownloader for ReleaseDownloader<G> {
    async fn download(&self, url: &str, dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .with_context(|| format!("could not create directory {}", dest_dir.display()))?;
        let dest = dest_dir.join(file_name);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            tracing::debug!(path = %dest.display(), "binary already present");
            return Ok(dest);
        }

        let tmp = tempfile::Builder::new()
            .prefix("download")
            .tempfile_in(dest_dir)
            .context("could not create temporary file")?;
        tracing::info!(%url, "downloading binary");

        let mut file = tokio::fs::File::from_std(tmp.reopen().context("could not open temporary file")?);
        self.fetch(&mut file, url)
            .await
            .with_context(|| format!("could not download from {url} to {}", tmp.path().display()))?;
        file.flush().await.context("could not flush download")?;
        drop(file);

        tokio::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o755))
            .await
            .with_context(|| format!("could not chmod file {}", tmp.path().display()))?;
        tmp.persist(&dest)
            .with_context(|| format!("could not move download to {}", dest.display()))?;
        Ok(dest)
    }
}
