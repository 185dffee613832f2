//! Planning a deployment: which stages run, which strategy applies and
//! which artifact versions ship.

use anyhow::{Context, Result};

use crate::application::ports::ManifestLoader;
use crate::domain::deployment::{Deployment, DeploymentSource};
use crate::domain::error::KubernetesError;
use crate::domain::pipeline::{
    build_pipeline_stages, build_quick_sync_stages, PipelineStage, StageConfig, StageName,
};
use crate::domain::spec::ApplicationConfig;
use crate::domain::strategy::{self, ArtifactVersion, StrategyDecision};

/// Names of every stage this engine can execute.
#[must_use]
pub fn fetch_defined_stages() -> Vec<&'static str> {
    StageName::ALL.iter().map(|s| s.as_str()).collect()
}

/// Stages of the application pipeline, or the quick sync stages when the
/// application declares no pipeline.
///
/// # Errors
///
/// Returns [`KubernetesError::UnsupportedStage`] for a pipeline stage this
/// engine does not know.
pub fn build_stages(
    config: &ApplicationConfig,
    rollback: bool,
) -> Result<Vec<PipelineStage>, KubernetesError> {
    match &config.spec.pipeline {
        Some(pipeline) if !pipeline.stages.is_empty() => {
            let stages: Vec<StageConfig> = pipeline
                .stages
                .iter()
                .enumerate()
                .map(|(index, stage)| StageConfig {
                    index,
                    name: stage.name.clone(),
                })
                .collect();
            build_pipeline_stages(&stages, rollback)
        }
        _ => Ok(build_quick_sync_stages(rollback)),
    }
}

/// Container images of the target commit.
pub async fn determine_versions(
    loader: &impl ManifestLoader,
    deployment: &Deployment,
    target: &DeploymentSource,
) -> Result<Vec<ArtifactVersion>> {
    let manifests = loader
        .load_manifests(&target.loader_input(deployment, None))
        .await
        .context("Failed while loading manifests")?;
    Ok(strategy::determine_versions(&manifests))
}

/// Compare the running and target commits and pick a sync strategy.
///
/// A missing running source, or one without a commit, is a first
/// deployment.
pub async fn determine_strategy(
    loader: &impl ManifestLoader,
    deployment: &Deployment,
    running: Option<&DeploymentSource>,
    target: &DeploymentSource,
) -> Result<StrategyDecision> {
    let running = match running.filter(|s| !s.commit_hash.is_empty()) {
        Some(source) => Some(
            loader
                .load_manifests(&source.loader_input(deployment, None))
                .await
                .context("Failed while loading running manifests")?,
        ),
        None => None,
    };
    let targets = loader
        .load_manifests(&target.loader_input(deployment, None))
        .await
        .context("Failed while loading target manifests")?;

    let decision = strategy::determine_strategy(
        running.as_deref(),
        &targets,
        &target.config.spec.workloads,
    );
    tracing::info!(
        app = %deployment.app_name,
        strategy = %decision.strategy,
        summary = %decision.summary,
        "determined sync strategy"
    );
    Ok(decision)
}
