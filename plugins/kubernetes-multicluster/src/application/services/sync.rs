//! `K8S_MULTI_SYNC`: apply the target commit to every effective deploy
//! target in parallel, then prune what Git no longer declares.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use pipecd_common::cancel;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::application::ports::{Cluster, Kubectl, ManifestLoader, StageLogPersister, ToolRegistry};
use crate::application::services::live_resources::get_live_resources;
use crate::application::services::rollback::execute_rollback_stage;
use crate::domain::deployment::{
    effective_targets, Deployment, DeploymentSource, EffectiveTarget, ExecuteStageInput,
    StageStatus,
};
use crate::domain::error::KubernetesError;
use crate::domain::labels::{
    ANNOTATION_CONFIG_HASH, ANNOTATION_FORCE_SYNC_BY_REPLACE, ANNOTATION_SYNC_BY_REPLACE,
    SYNC_BY_REPLACE_ENABLED,
};
use crate::domain::manifest::Manifest;
use crate::domain::pipeline::StageName;
use crate::domain::prune::find_remove_resources;
use crate::domain::spec::{DeployTarget, K8sSyncStageOptions};
use crate::domain::workload::{
    add_variant_labels_and_annotations, annotate_config_hash, ensure_variant_selector,
    is_selected_workload,
};

/// Pause between the last apply and the prune listing.
pub const PRUNE_SETTLE_PERIOD: Duration = Duration::from_secs(15);

// ── Ports bundle ──────────────────────────────────────────────────────────────

/// The collaborators a stage needs, borrowed for its duration.
pub struct StagePorts<'a, K, T, L> {
    pub kubectl: &'a K,
    pub tools: &'a T,
    pub loader: &'a L,
}

impl<K, T, L> Clone for StagePorts<'_, K, T, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, T, L> Copy for StagePorts<'_, K, T, L> {}

// ── Stage entry point ─────────────────────────────────────────────────────────

/// Run one stage of the deployment against `deploy_targets`.
///
/// Never returns an error: every failure is written to `lp` and turned into
/// [`StageStatus::Failure`].
pub async fn execute_stage<K, T, L>(
    ports: StagePorts<'_, K, T, L>,
    input: &ExecuteStageInput,
    deploy_targets: &[DeployTarget],
    lp: &impl StageLogPersister,
    token: &CancellationToken,
) -> StageStatus
where
    K: Kubectl,
    T: ToolRegistry,
    L: ManifestLoader,
{
    match input.stage_name {
        StageName::K8sMultiSync => execute_sync_stage(ports, input, deploy_targets, lp, token).await,
        StageName::K8sMultiRollback => {
            execute_rollback_stage(ports, input, deploy_targets, lp, token).await
        }
    }
}

/// Forward sync. Targets run concurrently and the stage fails if any of
/// them fails.
pub async fn execute_sync_stage<K, T, L>(
    ports: StagePorts<'_, K, T, L>,
    input: &ExecuteStageInput,
    deploy_targets: &[DeployTarget],
    lp: &impl StageLogPersister,
    token: &CancellationToken,
) -> StageStatus
where
    K: Kubectl,
    T: ToolRegistry,
    L: ManifestLoader,
{
    let options = match input.sync_options() {
        Ok(options) => options,
        Err(e) => {
            lp.error(&format!("Failed while unmarshalling stage config ({e})"));
            return StageStatus::Failure;
        }
    };
    let source = &input.target_source;
    let targets = resolve_targets(source, deploy_targets, lp);

    let workers = targets.iter().map(|target| {
        lp.info(&format!(
            "Start syncing the deployment to the target {}",
            target.name()
        ));
        let job = SyncJob {
            deployment: &input.deployment,
            source,
            options,
            target: *target,
        };
        run_target(ports, job, lp, token)
    });
    let outcomes = join_all(workers).await;

    let statuses = report_outcomes(&outcomes, lp);
    let status = StageStatus::all_succeeded(&statuses);
    if status == StageStatus::Failure {
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|(_, s)| *s == StageStatus::Failure)
            .map(|(name, _)| name.as_str())
            .collect();
        lp.error(&format!(
            "Failed while syncing the deployment to the targets {}",
            failed.join(", ")
        ));
    }
    status
}

/// Effective targets of `source`, logging multi-targets that match nothing.
pub(crate) fn resolve_targets<'a>(
    source: &'a DeploymentSource,
    deploy_targets: &'a [DeployTarget],
    lp: &impl StageLogPersister,
) -> Vec<EffectiveTarget<'a>> {
    let (targets, ignored) =
        effective_targets(deploy_targets, &source.config.spec.input.multi_targets);
    for name in ignored {
        lp.info(&format!(
            "Ignore multi target '{name}': not matched any deployTarget"
        ));
    }
    targets
}

/// Log `target <name>, status: <status>` for each outcome.
pub(crate) fn report_outcomes(
    outcomes: &[(String, StageStatus)],
    lp: &impl StageLogPersister,
) -> Vec<StageStatus> {
    outcomes
        .iter()
        .map(|(name, status)| {
            lp.info(&format!("target {name}, status: {status}"));
            *status
        })
        .collect()
}

// ── Per-target procedure ──────────────────────────────────────────────────────

/// Everything one target worker needs besides the ports.
#[derive(Clone, Copy)]
pub(crate) struct SyncJob<'a> {
    pub deployment: &'a Deployment,
    pub source: &'a DeploymentSource,
    pub options: K8sSyncStageOptions,
    pub target: EffectiveTarget<'a>,
}

/// Run [`sync_target`] for one target under its own span, converting the
/// result into a status. Cancellation drops the in-flight work.
pub(crate) async fn run_target<K, T, L>(
    ports: StagePorts<'_, K, T, L>,
    job: SyncJob<'_>,
    lp: &impl StageLogPersister,
    token: &CancellationToken,
) -> (String, StageStatus)
where
    K: Kubectl,
    T: ToolRegistry,
    L: ManifestLoader,
{
    let name = job.target.name().to_string();
    let span = tracing::info_span!("deploy_target", name = %name);
    let result = cancel::run_until_cancelled(token, sync_target(ports, job, lp, token))
        .instrument(span)
        .await
        .map_err(anyhow::Error::from)
        .and_then(|r| r);

    let status = match result {
        Ok(()) => StageStatus::Success,
        Err(e) => {
            lp.error(&format!("{e:#}"));
            StageStatus::Failure
        }
    };
    (name, status)
}

/// Load, mutate, apply and optionally prune the manifests of `job.source`
/// on one target.
pub(crate) async fn sync_target<K, T, L>(
    ports: StagePorts<'_, K, T, L>,
    job: SyncJob<'_>,
    lp: &impl StageLogPersister,
    token: &CancellationToken,
) -> Result<()>
where
    K: Kubectl,
    T: ToolRegistry,
    L: ManifestLoader,
{
    let SyncJob {
        deployment,
        source,
        options,
        target,
    } = job;
    let spec = &source.config.spec;

    lp.info(&format!(
        "Loading manifests at commit {} for handling",
        source.commit_hash
    ));
    let mut manifests = ports
        .loader
        .load_manifests(&source.loader_input(deployment, target.multi_target))
        .await
        .context("Failed while loading manifests")?;
    lp.success(&format!("Successfully loaded {} manifests", manifests.len()));

    let variant_label = &spec.variant_label.key;
    let primary_variant = &spec.variant_label.primary_value;
    if options.add_variant_label_to_selector {
        for m in manifests
            .iter_mut()
            .filter(|m| is_selected_workload(m, &spec.workloads))
        {
            ensure_variant_selector(m, variant_label, primary_variant).with_context(|| {
                format!(
                    "Unable to check/set {:?} in selector of workload {}",
                    format!("{variant_label}: {primary_variant}"),
                    m.key().readable_string()
                )
            })?;
        }
    }
    add_variant_labels_and_annotations(&mut manifests, variant_label, primary_variant);
    annotate_config_hash(&mut manifests).with_context(|| {
        format!("Unable to set {ANNOTATION_CONFIG_HASH:?} annotation into the workload manifest")
    })?;

    let kubectl_path = ports
        .tools
        .kubectl(target.kubectl_version(&source.config))
        .await
        .context("Failed while getting kubectl tool")?;
    let cluster = Cluster::new(kubectl_path, target.deploy_target.kube_config_path.clone());

    let namespace = spec.input.namespace.as_str();
    if spec.input.auto_create_namespace && !namespace.is_empty() {
        ensure_namespace(ports.kubectl, &cluster, namespace).await?;
    }

    apply_manifests(ports.kubectl, &cluster, &manifests, namespace, lp)
        .await
        .context("Failed while applying manifests")?;

    if !options.prune {
        lp.info("Resource GC was skipped because sync.prune was not configured");
        return Ok(());
    }
    prune(ports.kubectl, &cluster, deployment, &manifests, lp, token).await
}

async fn ensure_namespace(kubectl: &impl Kubectl, cluster: &Cluster, namespace: &str) -> Result<()> {
    match kubectl.create_namespace(cluster, namespace).await {
        Ok(()) => Ok(()),
        Err(e) if KubernetesError::is_already_exists(&e) => Ok(()),
        Err(e) => Err(e.context(format!("Failed while creating namespace {namespace}"))),
    }
}

/// Apply `manifests` in order, stopping at the first failure.
pub(crate) async fn apply_manifests(
    kubectl: &impl Kubectl,
    cluster: &Cluster,
    manifests: &[Manifest],
    namespace: &str,
    lp: &impl StageLogPersister,
) -> Result<()> {
    if manifests.is_empty() {
        lp.error("This application has no Kubernetes manifests to handle");
        return Ok(());
    }

    lp.info(&format!("Start applying {} manifests", manifests.len()));
    for m in manifests {
        apply_manifest(kubectl, cluster, namespace, m)
            .await
            .with_context(|| format!("Failed to apply manifest: {}", m.key().readable_string()))?;
        lp.success(&format!("- applied manifest: {}", m.key().readable_string()));
    }
    lp.success(&format!("Successfully applied {} manifests", manifests.len()));
    Ok(())
}

/// Apply one manifest, honouring the sync-by-replace annotations.
async fn apply_manifest(
    kubectl: &impl Kubectl,
    cluster: &Cluster,
    namespace: &str,
    manifest: &Manifest,
) -> Result<()> {
    let enabled = |key: &str| manifest.annotation(key) == Some(SYNC_BY_REPLACE_ENABLED);

    let replaced = if enabled(ANNOTATION_FORCE_SYNC_BY_REPLACE) {
        kubectl.force_replace(cluster, namespace, manifest).await
    } else if enabled(ANNOTATION_SYNC_BY_REPLACE) {
        kubectl.replace(cluster, namespace, manifest).await
    } else {
        return kubectl.apply(cluster, namespace, manifest).await;
    };

    match replaced {
        Err(e) if KubernetesError::is_not_found(&e) => {
            kubectl.create(cluster, namespace, manifest).await
        }
        other => other,
    }
}

/// Delete live objects of the application that `applied` no longer holds.
/// Individual delete failures are logged and skipped.
async fn prune(
    kubectl: &impl Kubectl,
    cluster: &Cluster,
    deployment: &Deployment,
    applied: &[Manifest],
    lp: &impl StageLogPersister,
    token: &CancellationToken,
) -> Result<()> {
    lp.info("Waiting for the applied manifests to be stable");
    cancel::sleep(token, PRUNE_SETTLE_PERIOD).await?;

    lp.info("Start finding all running resources but no longer defined in Git");
    let live = get_live_resources(kubectl, cluster, &deployment.app_id)
        .await
        .context("Failed while getting live resources")?;
    if live.is_empty() {
        lp.info("There is no data about live resource so no resource will be removed");
        return Ok(());
    }
    lp.success(&format!("Successfully loaded {} live resources", live.len()));

    let remove_keys = find_remove_resources(applied, &live.namespaced, &live.cluster_scoped);
    if remove_keys.is_empty() {
        lp.info("There are no live resources should be removed");
        return Ok(());
    }

    lp.info(&format!("Start pruning {} resources", remove_keys.len()));
    let mut deleted = 0usize;
    for key in &remove_keys {
        match kubectl.delete(cluster, &key.namespace, key).await {
            Ok(()) => {
                deleted += 1;
                lp.success(&format!("- deleted resource: {}", key.readable_string()));
            }
            Err(e) if KubernetesError::is_not_found(&e) => lp.info(&format!(
                "Specified resource does not exist, so skip deleting the resource: {} ({e:#})",
                key.readable_string()
            )),
            Err(e) => lp.error(&format!(
                "Failed while deleting resource {} ({e:#})",
                key.readable_string()
            )),
        }
    }
    lp.success(&format!("Successfully deleted {deleted} resources"));
    Ok(())
}
