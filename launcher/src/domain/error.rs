//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::application`,
//! `tokio`, `std::fs`, `std::process`, or `std::net`. Services wrap these in
//! `anyhow::Error` and callers recover them with `downcast_ref`.

use thiserror::Error;

// ── Launcher errors ───────────────────────────────────────────────────────────

/// Errors raised while reconciling the running piped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LauncherError {
    #[error("failed to load piped config: {0}")]
    ConfigLoad(String),

    #[error(
        "either [config-file, config-data, config-from-gcp-secret, config-from-aws-secret, config-from-git-repo] must be set"
    )]
    MissingConfigSource,

    #[error("invalid piped config: {0}")]
    InvalidConfig(String),

    #[error("{flag} must be set to load Piped config from {source_name}")]
    MissingFlag {
        flag: &'static str,
        source_name: &'static str,
    },

    #[error("invalid duration {0:?}: expected a number followed by ms, s, m or h")]
    InvalidDuration(String),

    #[error("failed to get desired version from {address}: {reason}")]
    DesiredVersion { address: String, reason: String },

    #[error("failed to download piped from {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("unsupported download scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("failed to start piped after {attempts} attempts: {reason}")]
    Start { attempts: u32, reason: String },
}

// ── OCI errors ────────────────────────────────────────────────────────────────

/// Errors raised while moving artifacts to and from an OCI registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OciError {
    #[error("invalid OCI URL {url:?}: {reason}")]
    BadUrl { url: String, reason: String },

    #[error("no matching manifest found for {os}/{arch}")]
    NoMatchingPlatform { os: String, arch: String },

    #[error("unsupported media type {0}")]
    UnsupportedMediaType(String),

    #[error("expected exactly one layer, got {0}")]
    LayerCount(usize),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("registry returned {status} for {method} {url}")]
    Registry {
        method: &'static str,
        url: String,
        status: u16,
    },

    #[error("registry authentication failed: {0}")]
    Auth(String),

    #[error("invalid OCI document: {0}")]
    Spec(String),
}
