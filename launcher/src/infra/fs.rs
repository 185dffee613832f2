//! Filesystem infrastructure: implements `LocalFs` with `tokio::fs`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::LocalFs;

/// Production filesystem implementation of `LocalFs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

impl LocalFs for TokioFs {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("reading file {}", path.display()))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tokio::fs::write(path, data)
            .await
            .with_context(|| format!("writing file {}", path.display()))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("creating directory {}", path.display()))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.with_context(|| format!("removing directory {}", path.display())),
        }
    }
}
