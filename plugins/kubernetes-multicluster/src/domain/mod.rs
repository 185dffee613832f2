//! Domain layer: manifests, diffs, strategy and sync-state rules.
//!
//! Nothing here spawns processes or touches the filesystem. Functions take
//! manifests and configuration in and return data out.

pub mod deployment;
pub mod diff;
pub mod error;
pub mod labels;
pub mod manifest;
pub mod pipeline;
pub mod prune;
pub mod resource_key;
pub mod spec;
pub mod strategy;
pub mod sync_state;
pub mod workload;

pub use error::KubernetesError;
pub use manifest::{Manifest, parse_manifests};
pub use resource_key::ResourceKey;
