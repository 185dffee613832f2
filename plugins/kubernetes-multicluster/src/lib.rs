//! Kubernetes multi-cluster deployment engine for piped.
//!
//! Renders the manifests of an application, chooses a sync strategy, applies
//! them to several clusters in parallel with prune and rollback, and reports
//! drift between Git and every cluster.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod application;
pub mod domain;
pub mod infra;
