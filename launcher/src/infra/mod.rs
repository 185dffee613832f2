//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process supervision,
//! filesystem access, config sources, the control plane client, binary
//! downloads and the OCI registry client.
//!
//! Imports from `crate::domain` and `crate::application` are allowed.
//! Imports from `crate::cli` are forbidden.

pub mod config_source;
pub mod control_plane;
pub mod download;
pub mod fs;
pub mod registry;
pub mod supervisor;

pub use config_source::PipedConfigSource;
pub use control_plane::GrpcControlPlane;
pub use download::ReleaseDownloader;
pub use fs::TokioFs;
pub use registry::HttpRegistry;
pub use supervisor::ProcessSupervisor;
