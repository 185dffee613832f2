//! Application services: use-case orchestration.
//!
//! Services import only from `crate::domain` and `crate::application::ports`.

pub mod desired_state;
pub mod launcher;
pub mod oci;

pub use launcher::{Launcher, LauncherOptions, LauncherPorts, TickOutcome};
