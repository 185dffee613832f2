//! Unit tests for OCI artifact push and pull against an in-memory registry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use piped_launcher::application::services::oci::{pull_artifact, push_artifact};
use piped_launcher::domain::OciError;
use piped_launcher::domain::oci::{ImageIndex, ImageManifest, MediaType};
use piped_launcher::domain::release::{PIPED_MEDIA_TYPE, Platform};

use crate::mocks::{MemoryFs, MemoryRegistry};

const URL: &str = "oci://registry.example.com/pipecd/piped:v0.41.2";

fn binaries(fs: &MemoryFs, platforms: &[(&str, &str)]) -> BTreeMap<Platform, PathBuf> {
    platforms
        .iter()
        .map(|(os, arch)| {
            let path = PathBuf::from(format!("/dist/piped_{os}_{arch}"));
            fs.files
                .lock()
                .unwrap()
                .insert(path.clone(), format!("piped for {os}/{arch}").into_bytes());
            (Platform::new(*os, *arch), path)
        })
        .collect()
}

async fn pushed(platforms: &[(&str, &str)]) -> MemoryRegistry {
    let registry = MemoryRegistry::default();
    let fs = MemoryFs::default();
    let files = binaries(&fs, platforms);
    push_artifact(&registry, &fs, URL, &files, PIPED_MEDIA_TYPE)
        .await
        .expect("push");
    registry
}

#[tokio::test]
async fn test_pull_selects_matching_platform() {
    let registry = pushed(&[("linux", "amd64"), ("linux", "arm64"), ("darwin", "arm64")]).await;

    let data = pull_artifact(&registry, URL, &Platform::new("linux", "arm64"), PIPED_MEDIA_TYPE)
        .await
        .unwrap();

    assert_eq!(data, b"piped for linux/arm64");
}

#[tokio::test]
async fn test_pull_without_matching_platform() {
    let registry = pushed(&[("linux", "amd64")]).await;

    let err = pull_artifact(&registry, URL, &Platform::new("windows", "amd64"), PIPED_MEDIA_TYPE)
        .await
        .expect_err("no windows build");

    assert!(matches!(
        err.downcast_ref::<OciError>(),
        Some(OciError::NoMatchingPlatform { os, arch }) if os == "windows" && arch == "amd64"
    ));
}

#[tokio::test]
async fn test_pull_wrong_media_type() {
    let registry = pushed(&[("linux", "amd64")]).await;

    let err = pull_artifact(
        &registry,
        URL,
        &Platform::new("linux", "amd64"),
        "application/vnd.pipecd.other",
    )
    .await
    .expect_err("media type");

    assert!(matches!(
        err.downcast_ref::<OciError>(),
        Some(OciError::UnsupportedMediaType(_))
    ));
}

#[tokio::test]
async fn test_pull_detects_corrupted_layer() {
    let registry = pushed(&[("linux", "amd64")]).await;
    // find the layer through the platform manifest
    let manifests = registry.manifests.lock().unwrap().clone();
    let (_, body) = manifests
        .values()
        .find(|(media_type, _)| *media_type == MediaType::ImageManifest.to_string())
        .cloned()
        .unwrap();
    let manifest: ImageManifest = serde_json::from_slice(&body).unwrap();
    registry.corrupt_blob(&manifest.layers()[0].digest().to_string(), b"tampered");

    let err = pull_artifact(&registry, URL, &Platform::new("linux", "amd64"), PIPED_MEDIA_TYPE)
        .await
        .expect_err("digest mismatch");

    assert!(matches!(
        err.downcast_ref::<OciError>(),
        Some(OciError::DigestMismatch { .. })
    ));
}

#[tokio::test]
async fn test_pull_by_digest_reference() {
    let registry = pushed(&[("linux", "amd64")]).await;
    let manifests = registry.manifests.lock().unwrap().clone();
    let digest = manifests
        .keys()
        .filter_map(|k| k.split_once('@'))
        .map(|(_, reference)| reference.to_string())
        .find(|reference| reference.starts_with("sha256:"))
        .unwrap();

    let url = format!("oci://registry.example.com/pipecd/piped@{digest}");
    let data = pull_artifact(&registry, &url, &Platform::new("linux", "amd64"), PIPED_MEDIA_TYPE)
        .await
        .unwrap();

    assert_eq!(data, b"piped for linux/amd64");
}

#[tokio::test]
async fn test_push_deduplicates_identical_layers() {
    let registry = MemoryRegistry::default();
    let fs = MemoryFs::default();
    let mut files = BTreeMap::new();
    for arch in ["amd64", "arm64"] {
        let path = PathBuf::from(format!("/dist/piped-{arch}"));
        fs.files.lock().unwrap().insert(path.clone(), b"same".to_vec());
        files.insert(Platform::new("linux", arch), path);
    }

    push_artifact(&registry, &fs, URL, &files, PIPED_MEDIA_TYPE)
        .await
        .unwrap();

    // config blob plus one shared layer
    assert_eq!(registry.blob_pushes.load(Ordering::SeqCst), 2);
    // two platform manifests plus the tagged index
    assert_eq!(registry.manifests.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_push_missing_file_fails() {
    let registry = MemoryRegistry::default();
    let mut files = BTreeMap::new();
    files.insert(Platform::new("linux", "amd64"), PathBuf::from("/dist/missing"));

    let err = push_artifact(&registry, &MemoryFs::default(), URL, &files, PIPED_MEDIA_TYPE)
        .await
        .expect_err("missing file");

    assert!(format!("{err:#}").contains("/dist/missing"));
}

#[tokio::test]
async fn test_pull_rejects_non_oci_url() {
    let err = pull_artifact(
        &MemoryRegistry::default(),
        "https://registry.example.com/pipecd/piped:v1",
        &Platform::new("linux", "amd64"),
        PIPED_MEDIA_TYPE,
    )
    .await
    .expect_err("bad url");

    assert!(matches!(err.downcast_ref::<OciError>(), Some(OciError::BadUrl { .. })));
}

#[tokio::test]
async fn test_push_writes_platform_index() {
    let registry = pushed(&[("linux", "amd64"), ("darwin", "arm64")]).await;

    let (media_type, body) = registry.manifests.lock().unwrap()["registry.example.com/pipecd/piped@v0.41.2"].clone();
    assert_eq!(media_type, MediaType::ImageIndex.to_string());
    let index: ImageIndex = serde_json::from_slice(&body).unwrap();
    let platforms: Vec<_> = index
        .manifests()
        .iter()
        .map(|m| {
            let p = m.platform().as_ref().unwrap();
            format!("{}/{}", p.os(), p.architecture())
        })
        .collect();
    assert_eq!(platforms, ["darwin/arm64", "linux/amd64"]);
}
