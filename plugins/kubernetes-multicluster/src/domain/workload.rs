//! Workload selection and the mutations applied to workloads before sync.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::error::KubernetesError;
use super::labels::ANNOTATION_CONFIG_HASH;
use super::manifest::Manifest;
use super::resource_key::{KIND_CONFIG_MAP, KIND_DEPLOYMENT, KIND_SECRET};
use super::spec::K8sResourceReference;

const MATCH_LABELS: &[&str] = &["spec", "selector", "matchLabels"];
const TEMPLATE_LABELS: &[&str] = &["spec", "template", "metadata", "labels"];
const CONFIG_HASH_LEN: usize = 10;

/// Whether `manifest` is one of the workloads selected by `refs`.
///
/// With no references every `Deployment` is a workload. Otherwise a manifest
/// matches a reference of the same kind (default `Deployment`) and, when the
/// reference names one, the same name.
#[must_use]
pub fn is_selected_workload(manifest: &Manifest, refs: &[K8sResourceReference]) -> bool {
    if refs.is_empty() {
        return manifest.kind() == KIND_DEPLOYMENT;
    }
    refs.iter().any(|r| {
        manifest.kind() == r.kind_or_default() && (r.name.is_empty() || manifest.name() == r.name)
    })
}

#[must_use]
pub fn find_workload_manifests<'a>(
    manifests: &'a [Manifest],
    refs: &[K8sResourceReference],
) -> Vec<&'a Manifest> {
    manifests
        .iter()
        .filter(|m| is_selected_workload(m, refs))
        .collect()
}

/// Put `{label: variant}` into both the selector and the pod template labels.
///
/// Running it twice is a no-op.
///
/// # Errors
///
/// Returns [`KubernetesError::SelectorConflict`] if either map already holds
/// `label` with a different value.
pub fn ensure_variant_selector(
    manifest: &mut Manifest,
    label: &str,
    variant: &str,
) -> Result<(), KubernetesError> {
    let values = BTreeMap::from([(label.to_string(), variant.to_string())]);
    manifest.add_string_map_values(&values, MATCH_LABELS)?;
    manifest.add_string_map_values(&values, TEMPLATE_LABELS)
}

pub fn add_variant_labels_and_annotations(manifests: &mut [Manifest], label: &str, variant: &str) {
    for manifest in manifests {
        manifest.add_labels([(label, variant)]);
        manifest.add_annotations([(label, variant)]);
    }
}

/// ConfigMaps and Secrets a pod template refers to, by kind and name.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigReferences {
    pub config_maps: BTreeSet<String>,
    pub secrets: BTreeSet<String>,
}

impl ConfigReferences {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.config_maps.is_empty() && self.secrets.is_empty()
    }

    fn add(&mut self, kind: &str, name: Option<&str>) {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return;
        };
        let set = if kind == KIND_SECRET {
            &mut self.secrets
        } else {
            &mut self.config_maps
        };
        set.insert(name.to_string());
    }
}

/// Collect references from container `env[*].valueFrom`, `envFrom`, and pod
/// volumes including projected sources.
#[must_use]
pub fn find_config_references(manifest: &Manifest) -> ConfigReferences {
    let mut refs = ConfigReferences::default();
    let str_at = |v: &Value, path: &[&str]| {
        path.iter()
            .try_fold(v, |v, step| v.get(*step))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    for containers in ["initContainers", "containers"] {
        for container in manifest.nested_slice(&["spec", "template", "spec", containers]) {
            let env = container.get("env").and_then(Value::as_array);
            for var in env.into_iter().flatten() {
                let cm = str_at(var, &["valueFrom", "configMapKeyRef", "name"]);
                refs.add(KIND_CONFIG_MAP, cm.as_deref());
                let secret = str_at(var, &["valueFrom", "secretKeyRef", "name"]);
                refs.add(KIND_SECRET, secret.as_deref());
            }
            let env_from = container.get("envFrom").and_then(Value::as_array);
            for source in env_from.into_iter().flatten() {
                refs.add(KIND_CONFIG_MAP, str_at(source, &["configMapRef", "name"]).as_deref());
                refs.add(KIND_SECRET, str_at(source, &["secretRef", "name"]).as_deref());
            }
        }
    }

    for volume in manifest.nested_slice(&["spec", "template", "spec", "volumes"]) {
        refs.add(KIND_CONFIG_MAP, str_at(volume, &["configMap", "name"]).as_deref());
        refs.add(KIND_SECRET, str_at(volume, &["secret", "secretName"]).as_deref());
        let sources = volume
            .get("projected")
            .and_then(|p| p.get("sources"))
            .and_then(Value::as_array);
        for source in sources.into_iter().flatten() {
            refs.add(KIND_CONFIG_MAP, str_at(source, &["configMap", "name"]).as_deref());
            refs.add(KIND_SECRET, str_at(source, &["secret", "name"]).as_deref());
        }
    }
    refs
}

/// Annotate every workload that references a ConfigMap or Secret from the
/// same manifest set with a hash of those objects, so that a config change
/// alters the pod template.
///
/// References to objects outside the set are ignored.
///
/// # Errors
///
/// Returns [`KubernetesError::InvalidManifest`] if a referenced object cannot
/// be encoded.
pub fn annotate_config_hash(manifests: &mut [Manifest]) -> Result<(), KubernetesError> {
    let mut configs: BTreeMap<(&str, String), String> = BTreeMap::new();
    for m in manifests.iter() {
        let kind = if m.key().is_config_map() {
            KIND_CONFIG_MAP
        } else if m.key().is_secret() {
            KIND_SECRET
        } else {
            continue;
        };
        let encoded = serde_json::to_string(m.body())
            .map_err(|e| KubernetesError::InvalidManifest(e.to_string()))?;
        configs.insert((kind, m.name().to_string()), encoded);
    }
    if configs.is_empty() {
        return Ok(());
    }

    let mut hashes = Vec::new();
    for (index, m) in manifests.iter().enumerate() {
        if !m.key().is_workload() {
            continue;
        }
        let refs = find_config_references(m);
        let wanted = refs
            .config_maps
            .iter()
            .map(|n| (KIND_CONFIG_MAP, n.clone()))
            .chain(refs.secrets.iter().map(|n| (KIND_SECRET, n.clone())));
        let found: Vec<&String> = wanted.filter_map(|k| configs.get(&k)).collect();
        if found.is_empty() {
            continue;
        }
        let mut hasher = Sha256::new();
        for encoded in found {
            hasher.update(encoded.as_bytes());
        }
        let mut hash = hex::encode(hasher.finalize());
        hash.truncate(CONFIG_HASH_LEN);
        hashes.push((index, hash));
    }

    for (index, hash) in hashes {
        manifests[index].set_nested(
            &["spec", "template", "metadata", "annotations", ANNOTATION_CONFIG_HASH],
            Value::String(hash),
        );
    }
    Ok(())
}
