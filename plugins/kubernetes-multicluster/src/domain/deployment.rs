//! A deployment as handed to the engine: the application, its sources at
//! the running and target commits, and the stage being executed.

use std::fmt;
use std::path::PathBuf;

use serde_json::Value;

use super::error::KubernetesError;
use super::pipeline::StageName;
use super::spec::{
    ApplicationConfig, DeployTarget, K8sSyncStageOptions, KubernetesMultiTarget, LoaderInput,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deployment {
    pub id: String,
    pub piped_id: String,
    pub app_id: String,
    pub app_name: String,
}

/// The application directory checked out at one commit.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentSource {
    pub commit_hash: String,
    pub app_dir: PathBuf,
    pub config_filename: String,
    pub config: ApplicationConfig,
}

impl DeploymentSource {
    /// Loader request for this source, with the manifest list of
    /// `multi_target` taking precedence when it declares one.
    #[must_use]
    pub fn loader_input(
        &self,
        deployment: &Deployment,
        multi_target: Option<&KubernetesMultiTarget>,
    ) -> LoaderInput {
        let input = &self.config.spec.input;
        let manifests = multi_target
            .filter(|t| !t.manifests.is_empty())
            .map_or_else(|| input.manifests.clone(), |t| t.manifests.clone());
        LoaderInput {
            piped_id: deployment.piped_id.clone(),
            app_id: deployment.app_id.clone(),
            commit_hash: self.commit_hash.clone(),
            app_name: deployment.app_name.clone(),
            app_dir: self.app_dir.clone(),
            config_filename: self.config_filename.clone(),
            manifests,
            namespace: input.namespace.clone(),
            kustomize_version: input.kustomize_version.clone(),
            kustomize_options: input.kustomize_options.clone(),
            helm_version: input.helm_version.clone(),
            helm_chart: input.helm_chart.clone(),
            helm_options: input.helm_options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteStageInput {
    pub deployment: Deployment,
    pub stage_name: StageName,
    /// The stage's `with` block; `None` for the quick sync stage.
    pub stage_config: Option<Value>,
    pub target_source: DeploymentSource,
    /// `None` on the first deployment of an application.
    pub running_source: Option<DeploymentSource>,
}

impl ExecuteStageInput {
    /// Options of the sync stage being executed, falling back to the
    /// application's quick sync block.
    ///
    /// # Errors
    ///
    /// Returns [`KubernetesError::InvalidConfig`] if the stage options do not
    /// decode.
    pub fn sync_options(&self) -> Result<K8sSyncStageOptions, KubernetesError> {
        match &self.stage_config {
            Some(with) => serde_json::from_value(with.clone())
                .map_err(|e| KubernetesError::InvalidConfig(format!("stage options: {e}"))),
            None => Ok(self.target_source.config.spec.quick_sync),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Success,
    Failure,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        })
    }
}

impl StageStatus {
    /// Forward sync succeeds only when every target did.
    #[must_use]
    pub fn all_succeeded(statuses: &[Self]) -> Self {
        if statuses.iter().all(|s| *s == Self::Success) {
            Self::Success
        } else {
            Self::Failure
        }
    }

    /// Rollback succeeds when at least one target did.
    #[must_use]
    pub fn any_succeeded(statuses: &[Self]) -> Self {
        if statuses.contains(&Self::Success) {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

/// A deploy target chosen for a stage, with its multi-target override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveTarget<'a> {
    pub deploy_target: &'a DeployTarget,
    pub multi_target: Option<&'a KubernetesMultiTarget>,
}

impl EffectiveTarget<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.deploy_target.name
    }

    /// First non-empty of the multi-target, application and deploy target
    /// kubectl versions.
    #[must_use]
    pub fn kubectl_version<'v>(&'v self, config: &'v ApplicationConfig) -> &'v str {
        [
            self.multi_target.map_or("", |t| t.kubectl_version.as_str()),
            config.spec.input.kubectl_version.as_str(),
            self.deploy_target.kubectl_version.as_str(),
        ]
        .into_iter()
        .find(|v| !v.is_empty())
        .unwrap_or("")
    }
}

/// Targets a stage runs against, and the multi-target names that match no
/// deploy target.
///
/// Without multi-targets every deploy target is used. Otherwise each
/// multi-target picks the deploy target of the same name, in declaration
/// order.
#[must_use]
pub fn effective_targets<'a>(
    deploy_targets: &'a [DeployTarget],
    multi_targets: &'a [KubernetesMultiTarget],
) -> (Vec<EffectiveTarget<'a>>, Vec<&'a str>) {
    if multi_targets.is_empty() {
        let all = deploy_targets
            .iter()
            .map(|deploy_target| EffectiveTarget {
                deploy_target,
                multi_target: None,
            })
            .collect();
        return (all, Vec::new());
    }

    let mut targets = Vec::with_capacity(multi_targets.len());
    let mut ignored = Vec::new();
    for multi_target in multi_targets {
        let name = multi_target.target.name.as_str();
        match deploy_targets.iter().find(|dt| dt.name == name) {
            Some(deploy_target) => targets.push(EffectiveTarget {
                deploy_target,
                multi_target: Some(multi_target),
            }),
            None => ignored.push(name),
        }
    }
    (targets, ignored)
}
