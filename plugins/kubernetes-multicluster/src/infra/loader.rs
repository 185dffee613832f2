//! Manifest rendering: Helm charts, Kustomize overlays and plain YAML.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;

use crate::application::ports::{CommandRunner, ManifestLoader, ToolRegistry};
use crate::domain::error::KubernetesError;
use crate::domain::labels::{
    ANNOTATION_ORDER, ANNOTATION_ORIGINAL_API_VERSION, ANNOTATION_RESOURCE_KEY, LABEL_APPLICATION,
    LABEL_COMMIT_HASH, LABEL_MANAGED_BY, LABEL_PIPED, MANAGED_BY_PIPED,
};
use crate::domain::manifest::{parse_manifests, Manifest};
use crate::domain::spec::{InputHelmChart, LoaderInput};

const KUSTOMIZATION_FILE: &str = "kustomization.yaml";
const ENABLE_HELM_OPTION: &str = "enable-helm";
const APPLICATION_CONFIG_SUFFIXES: &[&str] = &[".pipecd.yaml", ".pipecd.yml"];
const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// How an application directory is turned into manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatingMethod {
    Helm,
    Kustomize,
    PlainYaml,
}

/// Helm chart first, then a `kustomization.yaml`, then plain files.
#[must_use]
pub fn determine_templating_method(input: &LoaderInput) -> TemplatingMethod {
    if input.helm_chart.is_some() {
        TemplatingMethod::Helm
    } else if input.app_dir.join(KUSTOMIZATION_FILE).is_file() {
        TemplatingMethod::Kustomize
    } else {
        TemplatingMethod::PlainYaml
    }
}

/// [`ManifestLoader`] that shells out to helm and kustomize installed
/// through a [`ToolRegistry`].
pub struct RenderingLoader<'a, R, T> {
    runner: R,
    tools: &'a T,
}

impl<'a, R: CommandRunner, T: ToolRegistry> RenderingLoader<'a, R, T> {
    pub fn new(runner: R, tools: &'a T) -> Self {
        Self { runner, tools }
    }

    async fn render_helm(&self, input: &LoaderInput, chart: &InputHelmChart) -> Result<String> {
        let helm = self.tools.helm(&input.helm_version).await?;
        let args = helm_template_args(input, chart);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self
            .runner
            .run_in_dir(&input.app_dir, &helm.to_string_lossy(), &args)
            .await?;
        if !out.status.success() {
            return Err(render_failed("helm", &out.stderr).into());
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn render_kustomize(&self, input: &LoaderInput) -> Result<String> {
        let kustomize = self.tools.kustomize(&input.kustomize_version).await?;
        let helm = if input.kustomize_options.contains_key(ENABLE_HELM_OPTION) {
            if supports_enable_helm(&input.kustomize_version) {
                Some(self.tools.helm(&input.helm_version).await?)
            } else {
                tracing::warn!(
                    version = %input.kustomize_version,
                    "kustomize before 4.1.0 cannot inflate helm charts, ignoring --enable-helm"
                );
                None
            }
        } else {
            None
        };

        let args = kustomize_build_args(input, helm.as_deref());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self
            .runner
            .run_in_dir(&input.app_dir, &kustomize.to_string_lossy(), &args)
            .await?;
        if !out.status.success() {
            return Err(render_failed("kustomize", &out.stderr).into());
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl<R: CommandRunner, T: ToolRegistry> ManifestLoader for RenderingLoader<'_, R, T> {
    async fn load_manifests(&self, input: &LoaderInput) -> Result<Vec<Manifest>> {
        let method = determine_templating_method(input);
        tracing::debug!(app = %input.app_name, ?method, "rendering manifests");
        let mut manifests = match method {
            TemplatingMethod::Helm => {
                let chart = input.helm_chart.as_ref().context("helm chart is not set")?;
                let data = self
                    .render_helm(input, chart)
                    .await
                    .context("unable to run helm template")?;
                parse_manifests(&data)?
            }
            TemplatingMethod::Kustomize => {
                let data = self
                    .render_kustomize(input)
                    .await
                    .context("unable to run kustomize template")?;
                parse_manifests(&data)?
            }
            TemplatingMethod::PlainYaml => {
                load_plain_yaml_manifests(&input.app_dir, &input.manifests, &input.config_filename)
                    .await?
            }
        };

        if !input.namespace.is_empty() {
            for m in &mut manifests {
                m.set_key_namespace(&input.namespace);
            }
        }
        sort_manifests(&mut manifests);
        add_builtin_labels_and_annotations(&mut manifests, input);
        Ok(manifests)
    }
}

fn render_failed(tool: &str, stderr: &[u8]) -> KubernetesError {
    KubernetesError::RenderFailed {
        tool: tool.to_string(),
        reason: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

fn helm_template_args(input: &LoaderInput, chart: &InputHelmChart) -> Vec<String> {
    let release = input
        .helm_options
        .as_ref()
        .map(|o| o.release_name.as_str())
        .filter(|r| !r.is_empty())
        .unwrap_or(input.app_name.as_str());

    let mut args: Vec<String> = ["template", "--no-hooks", "--include-crds", release]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    if chart.repository.is_empty() {
        args.push(chart.path.clone());
    } else {
        args.push(format!("{}/{}", chart.repository, chart.name));
        args.push(format!("--version={}", chart.version));
    }
    if !input.namespace.is_empty() {
        args.push(format!("--namespace={}", input.namespace));
    }
    if let Some(opts) = &input.helm_options {
        for file in &opts.value_files {
            args.extend(["-f".to_string(), file.clone()]);
        }
        for (k, v) in &opts.set_files {
            args.extend(["--set-file".to_string(), format!("{k}={v}")]);
        }
        for v in &opts.api_versions {
            args.extend(["--api-versions".to_string(), v.clone()]);
        }
        if !opts.kube_version.is_empty() {
            args.extend(["--kube-version".to_string(), opts.kube_version.clone()]);
        }
    }
    args
}

fn kustomize_build_args(input: &LoaderInput, helm: Option<&Path>) -> Vec<String> {
    let mut args = vec!["build".to_string(), ".".to_string()];
    for (k, v) in &input.kustomize_options {
        if k == ENABLE_HELM_OPTION {
            continue;
        }
        args.push(format!("--{k}"));
        if !v.is_empty() {
            args.push(v.clone());
        }
    }
    if let Some(helm) = helm {
        args.push(format!("--{ENABLE_HELM_OPTION}"));
        args.extend(["--helm-command".to_string(), helm.to_string_lossy().into_owned()]);
    }
    args
}

/// `--enable-helm` exists from kustomize 4.1.0. An empty version means the
/// registry default, which predates it.
fn supports_enable_helm(version: &str) -> bool {
    let Ok(version) = Version::parse(version.trim_start_matches('v')) else {
        return false;
    };
    version >= Version::new(4, 1, 0)
}

/// Read `names` under `dir`, or every manifest file directly inside `dir`
/// when `names` is empty. Application config files are never loaded.
async fn load_plain_yaml_manifests(
    dir: &Path,
    names: &[String],
    config_filename: &str,
) -> Result<Vec<Manifest>> {
    let paths: Vec<PathBuf> = if names.is_empty() {
        list_manifest_files(dir, config_filename).await?
    } else {
        names.iter().map(|n| dir.join(n)).collect()
    };

    let mut manifests = Vec::new();
    for path in paths {
        let data = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to load manifest at {}", path.display()))?;
        let parsed = parse_manifests(&data)
            .with_context(|| format!("failed to load manifest at {}", path.display()))?;
        manifests.extend(parsed);
    }
    Ok(manifests)
}

async fn list_manifest_files(dir: &Path, config_filename: &str) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("reading {}", dir.display()))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_manifest = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e));
        let is_app_config = name == config_filename
            || APPLICATION_CONFIG_SUFFIXES.iter().any(|s| name.ends_with(s));
        if is_manifest && !is_app_config {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Stable sort by the integer in `pipecd.dev/order`; missing or malformed
/// values count as 0.
pub fn sort_manifests(manifests: &mut [Manifest]) {
    manifests.sort_by_key(|m| {
        m.annotation(ANNOTATION_ORDER)
            .and_then(|o| o.trim().parse::<i64>().ok())
            .unwrap_or(0)
    });
}

/// Stamp the ownership labels and annotations used to find the objects of
/// an application in a cluster.
pub fn add_builtin_labels_and_annotations(manifests: &mut [Manifest], input: &LoaderInput) {
    for m in manifests {
        m.add_labels([
            (LABEL_MANAGED_BY, MANAGED_BY_PIPED),
            (LABEL_PIPED, input.piped_id.as_str()),
            (LABEL_APPLICATION, input.app_id.as_str()),
            (LABEL_COMMIT_HASH, input.commit_hash.as_str()),
        ]);
        let api_version = m.api_version().to_string();
        let key = m.key().to_string();
        m.add_annotations([
            (LABEL_MANAGED_BY, MANAGED_BY_PIPED.to_string()),
            (LABEL_PIPED, input.piped_id.clone()),
            (LABEL_APPLICATION, input.app_id.clone()),
            (ANNOTATION_ORIGINAL_API_VERSION, api_version),
            (ANNOTATION_RESOURCE_KEY, key),
            (LABEL_COMMIT_HASH, input.commit_hash.clone()),
        ]);
    }
}
