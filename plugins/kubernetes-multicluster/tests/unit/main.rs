//! Unit tests for the Kubernetes multi-cluster engine.
//!
//! Services run against the in-memory ports of [`mocks`]; nothing here
//! talks to a cluster.

mod livestate_service;
mod sync_service;
mod tool_registry;
