//! Drift between Git and every deploy target of an application.

use anyhow::{Context, Result};

use crate::application::ports::{Cluster, Kubectl, ManifestLoader, ToolRegistry};
use crate::application::services::live_resources::get_live_resources;
use crate::application::services::sync::StagePorts;
use crate::domain::deployment::{effective_targets, Deployment, DeploymentSource};
use crate::domain::diff::{diff_list, DiffOptions};
use crate::domain::manifest::Manifest;
use crate::domain::spec::DeployTarget;
use crate::domain::sync_state::{calculate_sync_state, ResourceState, SyncState};

/// Live objects of an application across its targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationLiveState {
    pub resources: Vec<ResourceState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivestateReport {
    pub live_state: ApplicationLiveState,
    pub sync_state: SyncState,
}

/// List the live objects of every effective target and compare them with
/// the manifests of `source`.
///
/// Any target failure fails the whole report.
pub async fn get_livestate<K, T, L>(
    ports: StagePorts<'_, K, T, L>,
    deployment: &Deployment,
    source: &DeploymentSource,
    deploy_targets: &[DeployTarget],
) -> Result<LivestateReport>
where
    K: Kubectl,
    T: ToolRegistry,
    L: ManifestLoader,
{
    let (targets, ignored) =
        effective_targets(deploy_targets, &source.config.spec.input.multi_targets);
    for name in ignored {
        tracing::info!(multi_target = name, "Ignore multi target: not matched any deployTarget");
    }

    let mut report = LivestateReport::default();
    let mut states = Vec::with_capacity(targets.len());
    for target in targets {
        let name = target.name();
        let kubectl_path = ports
            .tools
            .kubectl(target.kubectl_version(&source.config))
            .await
            .context("Failed to get kubectl tool")?;
        let cluster = Cluster::new(kubectl_path, target.deploy_target.kube_config_path.clone());

        let live = get_live_resources(ports.kubectl, &cluster, &deployment.app_id)
            .await
            .with_context(|| format!("Failed to get live resources of {name}"))?;
        report
            .live_state
            .resources
            .extend(live.iter().map(|m| ResourceState::from_manifest(name, m)));

        let git = ports
            .loader
            .load_manifests(&source.loader_input(deployment, target.multi_target))
            .await
            .context("Failed to load manifests")?;

        let live: Vec<Manifest> = live.iter().cloned().collect();
        let diff = diff_list(&live, &git, DiffOptions::relaxed());
        let state = calculate_sync_state(&diff, &source.commit_hash, name);
        tracing::debug!(deploy_target = name, status = %state.status, "calculated sync state");
        states.push(state);
    }

    report.sync_state = SyncState::aggregate(&states);
    Ok(report)
}
