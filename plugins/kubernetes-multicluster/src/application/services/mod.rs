//! Use-cases of the engine: planning, stage execution and drift reporting.
//!
//! Services compose domain rules with the ports in
//! `crate::application::ports`; they never reach into `crate::infra`.

pub mod live_resources;
pub mod livestate;
pub mod planner;
pub mod rollback;
pub mod sync;
