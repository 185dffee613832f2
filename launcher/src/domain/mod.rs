//! Domain layer: pure launcher rules and types.
//!
//! This module has zero imports from `crate::infra`, `crate::application`,
//! `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod args;
pub mod error;
pub mod oci;
pub mod piped_config;
pub mod reconcile;
pub mod release;

pub use error::{LauncherError, OciError};
pub use piped_config::{LauncherSpec, PipedKeySource};
pub use reconcile::{ControlPlaneEndpoint, DesiredState, Relaunch};
pub use release::Platform;
