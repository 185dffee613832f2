//! Drift between Git and a cluster, and its aggregation across targets.

use std::fmt;

use super::diff::{DiffListResult, DiffRenderOptions};
use super::manifest::Manifest;
use super::resource_key::ResourceKey;

const SHORT_COMMIT_LEN: usize = 7;
const MAX_RENDERED_CHANGES: usize = 3;

/// Ordered by aggregation priority, lowest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncStatus {
    #[default]
    Synced,
    OutOfSync,
    Unknown,
    InvalidConfig,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Synced => "SYNCED",
            Self::OutOfSync => "OUT_OF_SYNC",
            Self::Unknown => "UNKNOWN",
            Self::InvalidConfig => "INVALID_CONFIG",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub status: SyncStatus,
    pub short_reason: String,
    pub reason: String,
}

impl SyncState {
    #[must_use]
    pub fn synced() -> Self {
        Self::default()
    }

    /// Combine per-target states: the highest-priority status wins and the
    /// non-empty reasons are joined line by line.
    #[must_use]
    pub fn aggregate(states: &[SyncState]) -> Self {
        let join = |pick: fn(&SyncState) -> &str| {
            states
                .iter()
                .map(pick)
                .filter(|r| !r.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        };
        Self {
            status: states
                .iter()
                .map(|s| s.status)
                .max()
                .unwrap_or_default(),
            short_reason: join(|s| s.short_reason.as_str()),
            reason: join(|s| s.reason.as_str()),
        }
    }
}

/// One live object as reported to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    pub deploy_target: String,
    pub key: ResourceKey,
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceState {
    #[must_use]
    pub fn from_manifest(deploy_target: &str, manifest: &Manifest) -> Self {
        Self {
            deploy_target: deploy_target.to_string(),
            key: manifest.key().clone(),
            api_version: manifest.api_version().to_string(),
            kind: manifest.kind().to_string(),
            namespace: manifest.namespace().to_string(),
            name: manifest.name().to_string(),
        }
    }
}

/// Translate a live-vs-Git diff of one target into a [`SyncState`].
#[must_use]
pub fn calculate_sync_state(diff: &DiffListResult, commit: &str, deploy_target: &str) -> SyncState {
    if diff.no_changes() {
        return SyncState::synced();
    }

    let short_reason = format!(
        "There are {} manifests not synced ({} adds, {} deletes, {} changes)",
        diff.total_out_of_sync(),
        diff.adds.len(),
        diff.deletes.len(),
        diff.changes.len()
    );
    let commit = commit.get(..SHORT_COMMIT_LEN).unwrap_or(commit);
    let mut reason = format!(
        "Diff between the defined state in Git at commit {commit} and actual state in cluster: {deploy_target}\n\n"
    );
    reason.push_str("--- Actual   (LiveState)\n+++ Expected (Git)\n\n");
    reason.push_str(&diff.render(DiffRenderOptions {
        mask_secret: true,
        mask_config_map: true,
        max_changed_manifests: MAX_RENDERED_CHANGES,
    }));

    SyncState {
        status: SyncStatus::OutOfSync,
        short_reason,
        reason,
    }
}
