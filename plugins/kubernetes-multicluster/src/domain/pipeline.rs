//! Stage names and pipeline construction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::KubernetesError;

const K8S_MULTI_SYNC: &str = "K8S_MULTI_SYNC";
const K8S_MULTI_ROLLBACK: &str = "K8S_MULTI_ROLLBACK";

/// Stages this engine knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    K8sMultiSync,
    K8sMultiRollback,
}

impl StageName {
    pub const ALL: [Self; 2] = [Self::K8sMultiSync, Self::K8sMultiRollback];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::K8sMultiSync => K8S_MULTI_SYNC,
            Self::K8sMultiRollback => K8S_MULTI_ROLLBACK,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::K8sMultiSync => "Sync by applying all manifests",
            Self::K8sMultiRollback => "Rollback the deployment",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = KubernetesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            K8S_MULTI_SYNC => Ok(Self::K8sMultiSync),
            K8S_MULTI_ROLLBACK => Ok(Self::K8sMultiRollback),
            other => Err(KubernetesError::UnsupportedStage(other.to_string())),
        }
    }
}

/// Manual operation a stage offers to users while it runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ManualOperation {
    #[default]
    None,
    Skip,
    Approve,
}

/// A stage as requested by the user pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    pub index: usize,
    pub name: StageName,
    pub description: String,
    pub rollback: bool,
    pub metadata: BTreeMap<String, String>,
    pub available_operation: ManualOperation,
}

impl PipelineStage {
    fn new(index: usize, name: StageName, rollback: bool) -> Self {
        Self {
            index,
            name,
            description: name.description().to_string(),
            rollback,
            metadata: BTreeMap::new(),
            available_operation: ManualOperation::None,
        }
    }
}

/// Copy the user stages and, when `rollback` is set, append a rollback
/// stage that shares the smallest forward index.
///
/// # Errors
///
/// Returns [`KubernetesError::UnsupportedStage`] for any unknown stage name.
pub fn build_pipeline_stages(
    stages: &[StageConfig],
    rollback: bool,
) -> Result<Vec<PipelineStage>, KubernetesError> {
    let mut out = stages
        .iter()
        .map(|stage| Ok(PipelineStage::new(stage.index, stage.name.parse()?, false)))
        .collect::<Result<Vec<_>, KubernetesError>>()?;

    if rollback {
        let index = stages.iter().map(|s| s.index).min().unwrap_or(0);
        out.push(PipelineStage::new(index, StageName::K8sMultiRollback, true));
    }
    Ok(out)
}

/// `[K8S_MULTI_SYNC]`, followed by `K8S_MULTI_ROLLBACK` when `rollback` is set.
#[must_use]
pub fn build_quick_sync_stages(rollback: bool) -> Vec<PipelineStage> {
    let mut out = vec![PipelineStage::new(0, StageName::K8sMultiSync, false)];
    if rollback {
        out.push(PipelineStage::new(0, StageName::K8sMultiRollback, true));
    }
    out
}
