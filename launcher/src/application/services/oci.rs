//! Application service: pull and push single-file artifacts over OCI.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! A pulled reference may name an image index (one manifest per platform)
//! or a single image manifest; both are walked by their media type.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::{LocalFs, OciRegistry};
use crate::domain::OciError;
use crate::domain::oci::{
    ANNOTATION_TITLE, Descriptor, ImageIndex, ImageManifest, MediaType, OciReference,
    artifact_manifest, descriptor_for, detect_media_type, find_platform, platform_index,
    set_platform, single_layer, verify_digest,
};
use crate::domain::release::Platform;

const EMPTY_CONFIG: &[u8] = b"{}";

/// Fetch the `media_type` layer built for `platform` from `url`.
///
/// # Errors
///
/// Returns [`OciError::BadUrl`] for a malformed URL,
/// [`OciError::NoMatchingPlatform`] when the index has no entry for
/// `platform`, [`OciError::UnsupportedMediaType`] for an unknown document or
/// layer type, and [`OciError::DigestMismatch`] for corrupted content.
pub async fn pull_artifact(
    registry: &impl OciRegistry,
    url: &str,
    platform: &Platform,
    media_type: &str,
) -> Result<Vec<u8>> {
    let repo = OciReference::parse(url)?;
    let (announced, mut body) = registry
        .fetch_manifest(&repo, &repo.reference)
        .await
        .with_context(|| format!("could not fetch {url}"))?;
    if repo.reference.starts_with("sha256:") {
        verify_digest(&repo.reference, &body)?;
    }
    let mut kind = detect_media_type(&announced, &body);

    if kind == MediaType::ImageIndex {
        let index: ImageIndex =
            serde_json::from_slice(&body).context("could not decode OCI image index")?;
        let digest = find_platform(&index, platform)?.digest().to_string();
        tracing::debug!(%platform, %digest, "selected manifest from index");
        let (announced, manifest) = registry
            .fetch_manifest(&repo, &digest)
            .await
            .context("could not fetch OCI image manifest")?;
        verify_digest(&digest, &manifest)?;
        kind = detect_media_type(&announced, &manifest);
        body = manifest;
    }

    if kind != MediaType::ImageManifest {
        return Err(OciError::UnsupportedMediaType(kind.to_string()).into());
    }
    let manifest: ImageManifest =
        serde_json::from_slice(&body).context("could not decode OCI image manifest")?;
    let digest = single_layer(&manifest, media_type)?.digest().to_string();
    let data = registry
        .fetch_blob(&repo, &digest)
        .await
        .context("could not fetch OCI layer")?;
    verify_digest(&digest, &data)?;
    Ok(data)
}

/// Push one file per platform as a multi-platform artifact tagged with the
/// reference of `url`.
///
/// Every file becomes a single-layer manifest pushed by digest; the index
/// referencing all of them is pushed under the tag.
///
/// # Errors
///
/// Returns an error when a file cannot be read or any upload fails.
pub async fn push_artifact(
    registry: &impl OciRegistry,
    fs: &impl LocalFs,
    url: &str,
    files: &BTreeMap<Platform, PathBuf>,
    media_type: &str,
) -> Result<Descriptor> {
    let repo = OciReference::parse(url)?;
    let config = descriptor_for(MediaType::EmptyJSON, EMPTY_CONFIG)?;
    registry
        .push_blob(&repo, &config, EMPTY_CONFIG)
        .await
        .context("could not push artifact config")?;

    let manifest_type = MediaType::ImageManifest.to_string();
    let mut pushed_layers = HashSet::new();
    let mut entries = Vec::with_capacity(files.len());
    for (platform, path) in files {
        let data = fs
            .read(path)
            .await
            .with_context(|| format!("could not read {}", path.display()))?;
        let mut layer = descriptor_for(MediaType::from(media_type), &data)?;
        if let Some(name) = path.file_name() {
            layer.set_annotations(Some(HashMap::from([(
                ANNOTATION_TITLE.to_string(),
                name.to_string_lossy().into_owned(),
            )])));
        }
        if pushed_layers.insert(layer.digest().to_string()) {
            registry
                .push_blob(&repo, &layer, &data)
                .await
                .with_context(|| format!("could not push layer for {platform}"))?;
        }

        let manifest = serde_json::to_vec(&artifact_manifest(layer, config.clone(), media_type)?)
            .context("could not encode OCI image manifest")?;
        let mut entry = descriptor_for(MediaType::ImageManifest, &manifest)?;
        registry
            .push_manifest(&repo, &entry.digest().to_string(), &manifest_type, &manifest)
            .await
            .with_context(|| format!("could not push manifest for {platform}"))?;
        set_platform(&mut entry, platform)?;
        tracing::debug!(%platform, digest = %entry.digest(), "pushed platform manifest");
        entries.push(entry);
    }

    let index = serde_json::to_vec(&platform_index(entries)?)
        .context("could not encode OCI image index")?;
    registry
        .push_manifest(&repo, &repo.reference, &MediaType::ImageIndex.to_string(), &index)
        .await
        .with_context(|| format!("could not push index to {url}"))?;
    let descriptor = descriptor_for(MediaType::ImageIndex, &index)?;
    tracing::info!(%url, digest = %descriptor.digest(), platforms = files.len(), "pushed artifact");
    Ok(descriptor)
}
