//! Canonical identity of a Kubernetes object.

use std::fmt;
use std::str::FromStr;

use super::error::KubernetesError;

pub const KIND_DEPLOYMENT: &str = "Deployment";
pub const KIND_REPLICA_SET: &str = "ReplicaSet";
pub const KIND_DAEMON_SET: &str = "DaemonSet";
pub const KIND_POD: &str = "Pod";
pub const KIND_CONFIG_MAP: &str = "ConfigMap";
pub const KIND_SECRET: &str = "Secret";
pub const KIND_SERVICE: &str = "Service";

pub const DEFAULT_NAMESPACE: &str = "default";

const BUILT_IN_GROUPS: &[&str] = &[
    "",
    "admissionregistration.k8s.io",
    "apiextensions.k8s.io",
    "apiregistration.k8s.io",
    "apps",
    "authentication.k8s.io",
    "authorization.k8s.io",
    "autoscaling",
    "batch",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "extensions",
    "internal.autoscaling.k8s.io",
    "metrics.k8s.io",
    "networking.k8s.io",
    "node.k8s.io",
    "policy",
    "rbac.authorization.k8s.io",
    "scheduling.k8s.io",
    "storage.k8s.io",
];

/// `(group, kind, namespace, name)`. Two manifests describe the same object
/// iff their keys are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

/// The group part of an `apiVersion` (`apps/v1` → `apps`, `v1` → ``).
#[must_use]
pub fn group_of(api_version: &str) -> &str {
    api_version
        .split_once('/')
        .map_or("", |(group, _version)| group)
}

#[must_use]
pub fn is_built_in_group(group: &str) -> bool {
    BUILT_IN_GROUPS.contains(&group)
}

impl ResourceKey {
    #[must_use]
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            group: group_of(api_version).to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Copy of this key with an empty namespace replaced by `default`.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let mut key = self.clone();
        if key.namespace.is_empty() {
            key.namespace = DEFAULT_NAMESPACE.to_string();
        }
        key
    }

    /// Copy of this key with the namespace cleared.
    #[must_use]
    pub fn without_namespace(&self) -> Self {
        Self {
            namespace: String::new(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn readable_string(&self) -> String {
        format!(
            "name={:?}, kind={:?}, namespace={:?}, group={:?}",
            self.name, self.kind, self.namespace, self.group
        )
    }

    fn is_built_in_kind(&self, kind: &str) -> bool {
        self.kind == kind && is_built_in_group(&self.group)
    }

    #[must_use]
    pub fn is_workload(&self) -> bool {
        is_built_in_group(&self.group)
            && matches!(
                self.kind.as_str(),
                KIND_DEPLOYMENT | KIND_REPLICA_SET | KIND_DAEMON_SET | KIND_POD
            )
    }

    #[must_use]
    pub fn is_deployment(&self) -> bool {
        self.is_built_in_kind(KIND_DEPLOYMENT)
    }

    #[must_use]
    pub fn is_config_map(&self) -> bool {
        self.is_built_in_kind(KIND_CONFIG_MAP)
    }

    #[must_use]
    pub fn is_secret(&self) -> bool {
        self.is_built_in_kind(KIND_SECRET)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.group, self.kind, self.namespace, self.name
        )
    }
}

impl FromStr for ResourceKey {
    type Err = KubernetesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(4, ':').collect();
        let [group, kind, namespace, name] = parts.as_slice() else {
            return Err(KubernetesError::InvalidResourceKey(s.to_string()));
        };
        if kind.is_empty() || name.is_empty() {
            return Err(KubernetesError::InvalidResourceKey(s.to_string()));
        }
        Ok(Self {
            group: (*group).to_string(),
            kind: (*kind).to_string(),
            namespace: (*namespace).to_string(),
            name: (*name).to_string(),
        })
    }
}
