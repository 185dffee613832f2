//! `K8S_MULTI_ROLLBACK`: re-apply the running commit to every target.
//!
//! Partial success is accepted: the stage succeeds when at least one target
//! was rolled back.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Kubectl, ManifestLoader, StageLogPersister, ToolRegistry};
use crate::application::services::sync::{
    report_outcomes, resolve_targets, run_target, StagePorts, SyncJob,
};
use crate::domain::deployment::{ExecuteStageInput, StageStatus};
use crate::domain::error::KubernetesError;
use crate::domain::spec::DeployTarget;

/// Roll every effective target back to the running deployment source.
///
/// Targets are resolved from the running config and synced with its quick
/// sync options.
pub async fn execute_rollback_stage<K, T, L>(
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
    let Some(source) = input
        .running_source
        .as_ref()
        .filter(|s| !s.commit_hash.is_empty())
    else {
        lp.error(&KubernetesError::NoPreviousDeployment.to_string());
        return StageStatus::Failure;
    };

    let options = source.config.spec.quick_sync;
    let targets = resolve_targets(source, deploy_targets, lp);

    let workers = targets.iter().map(|target| {
        lp.info(&format!(
            "Start rolling back the deployment for the target {}",
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

    StageStatus::any_succeeded(&report_outcomes(&outcomes, lp))
}
