//! A single Kubernetes object parsed from YAML.
//!
//! A [`Manifest`] is a plain value: cloning it is a deep copy, and every
//! mutating method takes `&mut self`. Services hand out `&[Manifest]` and
//! clone before they label, inject selectors or annotate config hashes.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::KubernetesError;
use super::resource_key::ResourceKey;

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    key: ResourceKey,
    body: Value,
}

/// Split a multi-document YAML string and decode every non-empty document.
///
/// # Errors
///
/// Returns [`KubernetesError::InvalidManifest`] if any document cannot be
/// decoded or is not a Kubernetes object.
pub fn parse_manifests(data: &str) -> Result<Vec<Manifest>, KubernetesError> {
    let mut manifests = Vec::new();
    for document in serde_yaml::Deserializer::from_str(data) {
        let body = Value::deserialize(document)
            .map_err(|e| KubernetesError::InvalidManifest(e.to_string()))?;
        if body.is_null() {
            continue;
        }
        manifests.push(Manifest::from_value(body)?);
    }
    Ok(manifests)
}

impl Manifest {
    /// Wrap a decoded object, deriving its key from `apiVersion`, `kind`,
    /// `metadata.namespace` and `metadata.name`.
    ///
    /// # Errors
    ///
    /// Returns [`KubernetesError::InvalidManifest`] if `body` is not a map or
    /// has no `kind`.
    pub fn from_value(body: Value) -> Result<Self, KubernetesError> {
        if !body.is_object() {
            return Err(KubernetesError::InvalidManifest(format!(
                "expected a mapping, got {body}"
            )));
        }
        let str_at = |path: &[&str]| nested(&body, path).and_then(Value::as_str).unwrap_or("");
        let kind = str_at(&["kind"]);
        if kind.is_empty() {
            return Err(KubernetesError::InvalidManifest(
                "missing required field kind".to_string(),
            ));
        }
        let key = ResourceKey::new(
            str_at(&["apiVersion"]),
            kind,
            str_at(&["metadata", "namespace"]),
            str_at(&["metadata", "name"]),
        );
        Ok(Self { key, body })
    }

    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Override the namespace recorded in the key without touching the body.
    pub fn set_key_namespace(&mut self, namespace: &str) {
        self.key.namespace = namespace.to_string();
    }

    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        self.nested_str(&["apiVersion"]).unwrap_or("")
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.key.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// Namespace as written in the body (may be empty).
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.nested_str(&["metadata", "namespace"]).unwrap_or("")
    }

    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.nested_string_map(&["metadata", "labels"])
    }

    #[must_use]
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.nested_string_map(&["metadata", "annotations"])
    }

    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.nested(&["metadata", "annotations", key])
            .and_then(Value::as_str)
    }

    /// Merge `labels` into `metadata.labels`, overwriting existing keys.
    pub fn add_labels<K, V>(&mut self, labels: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = self.object_at_mut(&["metadata", "labels"]);
        for (k, v) in labels {
            map.insert(k.into(), Value::String(v.into()));
        }
    }

    /// Merge `annotations` into `metadata.annotations`, overwriting existing keys.
    pub fn add_annotations<K, V>(&mut self, annotations: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = self.object_at_mut(&["metadata", "annotations"]);
        for (k, v) in annotations {
            map.insert(k.into(), Value::String(v.into()));
        }
    }

    /// Merge `values` into the string map at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KubernetesError::SelectorConflict`] if a key already holds
    /// a different value. Nothing is written in that case.
    pub fn add_string_map_values(
        &mut self,
        values: &BTreeMap<String, String>,
        path: &[&str],
    ) -> Result<(), KubernetesError> {
        let current = self.nested_string_map(path);
        for (k, v) in values {
            if let Some(existing) = current.get(k) {
                if existing != v {
                    return Err(KubernetesError::SelectorConflict {
                        workload: self.key.readable_string(),
                        field: path.join("."),
                        label: k.clone(),
                        existing: existing.clone(),
                        wanted: v.clone(),
                    });
                }
            }
        }
        let map = self.object_at_mut(path);
        for (k, v) in values {
            map.insert(k.clone(), Value::String(v.clone()));
        }
        Ok(())
    }

    #[must_use]
    pub fn nested(&self, path: &[&str]) -> Option<&Value> {
        nested(&self.body, path)
    }

    #[must_use]
    pub fn nested_str(&self, path: &[&str]) -> Option<&str> {
        self.nested(path).and_then(Value::as_str)
    }

    /// String entries of the map at `path`; non-string values are skipped.
    #[must_use]
    pub fn nested_string_map(&self, path: &[&str]) -> BTreeMap<String, String> {
        self.nested(path)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Elements of the array at `path`, or an empty slice.
    #[must_use]
    pub fn nested_slice(&self, path: &[&str]) -> &[Value] {
        self.nested(path)
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Set `value` at `path`, creating intermediate maps.
    pub fn set_nested(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        self.object_at_mut(parents)
            .insert((*last).to_string(), value);
    }

    /// Serialise the body back to YAML for kubectl.
    ///
    /// # Errors
    ///
    /// Returns [`KubernetesError::InvalidManifest`] if encoding fails.
    pub fn to_yaml(&self) -> Result<String, KubernetesError> {
        serde_yaml::to_string(&self.body).map_err(|e| KubernetesError::InvalidManifest(e.to_string()))
    }

    fn object_at_mut(&mut self, path: &[&str]) -> &mut Map<String, Value> {
        let mut current = ensure_object(&mut self.body);
        for step in path {
            let entry = current
                .entry((*step).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = ensure_object(entry);
        }
        current
    }
}

/// The map held by `value`, replacing any non-map value with an empty map.
fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            *other = Value::Object(Map::new());
            ensure_object(other)
        }
    }
}

fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, step| current.get(step))
}
