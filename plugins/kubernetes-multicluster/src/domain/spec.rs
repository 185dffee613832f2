//! Application configuration checked into Git, deploy targets, and the
//! loader request derived from both.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::KubernetesError;
use super::labels::{
    DEFAULT_BASELINE_VARIANT, DEFAULT_CANARY_VARIANT, DEFAULT_PRIMARY_VARIANT,
    DEFAULT_VARIANT_LABEL,
};
use super::resource_key::KIND_DEPLOYMENT;

const ACCEPTED_KINDS: &[&str] = &["Application", "KubernetesApp"];

/// Top-level application config document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfig {
    #[serde(default)]
    pub api_version: String,
    pub kind: String,
    pub spec: KubernetesApplicationSpec,
}

impl ApplicationConfig {
    /// Decode and validate an application config.
    ///
    /// # Errors
    ///
    /// Returns [`KubernetesError::InvalidConfig`] on malformed YAML, an
    /// unexpected `kind`, or a duplicated multi-target name.
    pub fn from_yaml(data: &str) -> Result<Self, KubernetesError> {
        let config: Self =
            serde_yaml::from_str(data).map_err(|e| KubernetesError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), KubernetesError> {
        if !ACCEPTED_KINDS.contains(&self.kind.as_str()) {
            return Err(KubernetesError::InvalidConfig(format!(
                "unexpected kind {:?}, want one of {ACCEPTED_KINDS:?}",
                self.kind
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for target in &self.spec.input.multi_targets {
            if !seen.insert(target.target.name.as_str()) {
                return Err(KubernetesError::InvalidConfig(format!(
                    "multi target {:?} is declared more than once",
                    target.target.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesApplicationSpec {
    pub name: String,
    pub input: KubernetesDeploymentInput,
    pub quick_sync: K8sSyncStageOptions,
    pub workloads: Vec<K8sResourceReference>,
    pub variant_label: KubernetesVariantLabel,
    pub pipeline: Option<DeploymentPipeline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesDeploymentInput {
    pub manifests: Vec<String>,
    pub kubectl_version: String,
    pub kustomize_version: String,
    pub kustomize_options: BTreeMap<String, String>,
    pub helm_version: String,
    pub helm_chart: Option<InputHelmChart>,
    pub helm_options: Option<InputHelmOptions>,
    pub namespace: String,
    pub auto_create_namespace: bool,
    pub multi_targets: Vec<KubernetesMultiTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputHelmChart {
    /// Chart directory relative to the application directory.
    pub path: String,
    /// Name of a Helm chart repository added to the local helm.
    pub repository: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InputHelmOptions {
    pub release_name: String,
    pub value_files: Vec<String>,
    pub set_files: BTreeMap<String, String>,
    pub api_versions: Vec<String>,
    pub kube_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesMultiTarget {
    pub target: MultiTargetRef,
    pub manifests: Vec<String>,
    pub kubectl_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiTargetRef {
    pub name: String,
}

/// Options of a `K8S_MULTI_SYNC` stage, also used as the quick sync block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct K8sSyncStageOptions {
    pub add_variant_label_to_selector: bool,
    pub prune: bool,
}

/// Selects workloads by kind (default `Deployment`) and optionally name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct K8sResourceReference {
    pub kind: String,
    pub name: String,
}

impl K8sResourceReference {
    #[must_use]
    pub fn kind_or_default(&self) -> &str {
        if self.kind.is_empty() {
            KIND_DEPLOYMENT
        } else {
            &self.kind
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesVariantLabel {
    pub key: String,
    pub primary_value: String,
    pub canary_value: String,
    pub baseline_value: String,
}

impl Default for KubernetesVariantLabel {
    fn default() -> Self {
        Self {
            key: DEFAULT_VARIANT_LABEL.to_string(),
            primary_value: DEFAULT_PRIMARY_VARIANT.to_string(),
            canary_value: DEFAULT_CANARY_VARIANT.to_string(),
            baseline_value: DEFAULT_BASELINE_VARIANT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentPipeline {
    pub stages: Vec<PipelineStageConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineStageConfig {
    pub name: String,
    /// Stage options, decoded per stage kind.
    pub with: Option<Value>,
}

/// A named cluster this piped can deploy to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployTarget {
    pub name: String,
    pub kube_config_path: String,
    pub kubectl_version: String,
}

/// Everything the loader needs to render one application at one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderInput {
    pub piped_id: String,
    pub app_id: String,
    pub commit_hash: String,
    pub app_name: String,
    pub app_dir: PathBuf,
    pub config_filename: String,
    pub manifests: Vec<String>,
    pub namespace: String,
    pub kustomize_version: String,
    pub kustomize_options: BTreeMap<String, String>,
    pub helm_version: String,
    pub helm_chart: Option<InputHelmChart>,
    pub helm_options: Option<InputHelmOptions>,
}
