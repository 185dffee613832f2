//! Integration tests for the Kubernetes multi-cluster engine.
//!
//! The real kubectl adapter, manifest loader and tool registry run against
//! [`fake_cluster::FakeCluster`], which answers kubectl invocations from an
//! in-memory object store.
