//! Sync strategy selection and artifact version discovery.

use std::fmt;

use serde_json::Value;

use super::diff::{diff_list, DiffListResult, DiffNode, DiffOptions};
use super::labels::LABEL_COMMIT_HASH;
use super::manifest::Manifest;
use super::spec::K8sResourceReference;
use super::workload::is_selected_workload;

const IMAGE_PATH: &[&str] = &[
    "spec",
    "template",
    "spec",
    "initContainers|containers",
    "*",
    "image",
];
const COMMIT_HASH_PATH: &[&str] = &["metadata", "labels|annotations", LABEL_COMMIT_HASH];
const DEFAULT_IMAGE_TAG: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    QuickSync,
    PipelineSync,
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::QuickSync => "QUICK_SYNC",
            Self::PipelineSync => "PIPELINE_SYNC",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDecision {
    pub strategy: SyncStrategy,
    pub summary: String,
}

impl StrategyDecision {
    fn quick(summary: impl Into<String>) -> Self {
        Self {
            strategy: SyncStrategy::QuickSync,
            summary: summary.into(),
        }
    }

    fn pipeline(summary: impl Into<String>) -> Self {
        Self {
            strategy: SyncStrategy::PipelineSync,
            summary: summary.into(),
        }
    }
}

/// Choose between a one-shot apply and the user pipeline.
///
/// `running` is `None` when nothing has been deployed yet. The commit hash
/// the loader stamps on every manifest is not treated as a change.
#[must_use]
pub fn determine_strategy(
    running: Option<&[Manifest]>,
    target: &[Manifest],
    workloads: &[K8sResourceReference],
) -> StrategyDecision {
    let Some(running) = running else {
        return StrategyDecision::quick(
            "Quick sync by applying all manifests because it seems this is the first deployment",
        );
    };

    let options = DiffOptions {
        equate_empty: true,
        ..DiffOptions::default()
    };
    let mut result = diff_list(running, target, options);
    result.changes.retain(|change| {
        change
            .diff
            .nodes()
            .iter()
            .any(|node| !node.path_matches(COMMIT_HASH_PATH))
    });
    if result.no_changes() {
        return StrategyDecision::quick(
            "Quick sync by applying all manifests because there are no changes",
        );
    }

    if let Some(images) = image_only_changes(&result, workloads) {
        return StrategyDecision::quick(format!("Quick sync to update {}", images.join(", ")));
    }

    StrategyDecision::pipeline(pipeline_reason(&result, workloads))
}

/// Describe every image update when that is all that changed, restricted to
/// selected workloads.
fn image_only_changes(result: &DiffListResult, workloads: &[K8sResourceReference]) -> Option<Vec<String>> {
    if !result.adds.is_empty() || !result.deletes.is_empty() {
        return None;
    }
    let mut images = Vec::new();
    for change in &result.changes {
        if !is_selected_workload(&change.new, workloads) {
            return None;
        }
        for node in change.diff.nodes() {
            if node.path_matches(COMMIT_HASH_PATH) {
                continue;
            }
            images.push(describe_image_change(node)?);
        }
    }
    Some(images)
}

fn describe_image_change(node: &DiffNode) -> Option<String> {
    if !node.path_matches(IMAGE_PATH) {
        return None;
    }
    let old = parse_container_image(node.x.as_ref()?.as_str()?);
    let new = parse_container_image(node.y.as_ref()?.as_str()?);
    if old.name == new.name {
        Some(format!("image {} from {} to {}", new.name, old.tag, new.tag))
    } else {
        Some(format!(
            "image {}:{} to {}:{}",
            old.name, old.tag, new.name, new.tag
        ))
    }
}

fn pipeline_reason(result: &DiffListResult, workloads: &[K8sResourceReference]) -> String {
    if let Some(change) = result
        .changes
        .iter()
        .find(|c| c.new.key().is_config_map() || c.new.key().is_secret())
    {
        return format!(
            "Sync progressively because of updating the config/secret {}",
            change.new.name()
        );
    }
    if let Some(m) = result
        .adds
        .iter()
        .chain(&result.deletes)
        .find(|m| is_selected_workload(m, workloads))
    {
        return format!(
            "Sync progressively because of adding/removing the workload {}",
            m.name()
        );
    }
    if let Some(change) = result
        .changes
        .iter()
        .find(|c| is_selected_workload(&c.new, workloads))
    {
        return format!(
            "Sync progressively because of updating the workload {}",
            change.new.name()
        );
    }
    let key = result
        .changes
        .first()
        .map(|c| c.new.key())
        .or_else(|| result.adds.first().map(Manifest::key))
        .or_else(|| result.deletes.first().map(Manifest::key));
    match key {
        Some(key) => format!(
            "Sync progressively because of changing the manifest {}",
            key.readable_string()
        ),
        None => "Sync progressively with the specified pipeline".to_string(),
    }
}

/// Name and tag (or digest) of a container image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImage {
    pub name: String,
    pub tag: String,
}

/// `gcr.io/pipecd/helloworld:v0.1.0` is `helloworld` at `v0.1.0`. A digest
/// reference keeps the digest as its tag and a bare reference is `latest`.
#[must_use]
pub fn parse_container_image(image: &str) -> ContainerImage {
    let (repository, tag) = if let Some((repository, digest)) = image.split_once('@') {
        (repository, digest)
    } else {
        let last_slash = image.rfind('/').map_or(0, |i| i + 1);
        match image[last_slash..].rfind(':') {
            Some(i) => (&image[..last_slash + i], &image[last_slash + i + 1..]),
            None => (image, DEFAULT_IMAGE_TAG),
        }
    };
    let name = repository.rsplit('/').next().unwrap_or(repository);
    ContainerImage {
        name: name.to_string(),
        tag: tag.to_string(),
    }
}

/// A deployed artifact as reported to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactVersion {
    pub name: String,
    pub version: String,
    pub url: String,
}

/// Container images used by pod templates, in manifest order, without
/// duplicates.
#[must_use]
pub fn determine_versions(manifests: &[Manifest]) -> Vec<ArtifactVersion> {
    let mut versions: Vec<ArtifactVersion> = Vec::new();
    for manifest in manifests {
        for containers in ["initContainers", "containers"] {
            let path = ["spec", "template", "spec", containers];
            for container in manifest.nested_slice(&path) {
                let Some(url) = container.get("image").and_then(Value::as_str) else {
                    continue;
                };
                if versions.iter().any(|v| v.url == url) {
                    continue;
                }
                let image = parse_container_image(url);
                versions.push(ArtifactVersion {
                    name: image.name,
                    version: image.tag,
                    url: url.to_string(),
                });
            }
        }
    }
    versions
}
