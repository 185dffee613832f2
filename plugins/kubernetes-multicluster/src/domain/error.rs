//! Typed domain errors.
//!
//! Infrastructure and services return `anyhow::Result`; these kinds are
//! carried inside and recovered with [`KubernetesError::from_anyhow`] where a
//! caller has to branch on them (prune skips `NotFound`, namespace creation
//! swallows `AlreadyExists`).

use pipecd_common::Cancelled;
use thiserror::Error;

/// Errors raised by the Kubernetes deployment engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KubernetesError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid resource key {0:?}: expected group:kind:namespace:name")]
    InvalidResourceKey(String),

    #[error("invalid application config: {0}")]
    InvalidConfig(String),

    #[error("failed to install {tool} {version}: {reason}")]
    ToolInstall {
        tool: String,
        version: String,
        reason: String,
    },

    #[error("failed to render manifests with {tool}: {reason}")]
    RenderFailed { tool: String, reason: String },

    #[error("kubectl {command} failed: {stderr}")]
    KubectlExec { command: String, stderr: String },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error(
        "workload {workload} already has {label}={existing} at {field}, refusing to set it to {wanted}"
    )]
    SelectorConflict {
        workload: String,
        field: String,
        label: String,
        existing: String,
        wanted: String,
    },

    #[error(
        "Unable to determine the last deployed commit to rollback. It seems this is the first deployment."
    )]
    NoPreviousDeployment,

    #[error("unsupported stage {0}")]
    UnsupportedStage(String),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl KubernetesError {
    /// Find a typed kind anywhere in an `anyhow` chain.
    #[must_use]
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&Self> {
        err.chain().find_map(|cause| cause.downcast_ref::<Self>())
    }

    /// Whether the chain carries `NotFound`.
    #[must_use]
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(Self::from_anyhow(err), Some(Self::NotFound(_)))
    }

    /// Whether the chain carries `AlreadyExists`.
    #[must_use]
    pub fn is_already_exists(err: &anyhow::Error) -> bool {
        matches!(Self::from_anyhow(err), Some(Self::AlreadyExists(_)))
    }

    /// Whether the chain carries a cancellation.
    #[must_use]
    pub fn is_cancelled(err: &anyhow::Error) -> bool {
        matches!(Self::from_anyhow(err), Some(Self::Cancelled(_)))
            || err.chain().any(|cause| cause.is::<Cancelled>())
    }
}
