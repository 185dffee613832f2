//! Tool installation shared between concurrent requests.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use futures::future::join_all;
use kubernetes_multicluster::application::ports::ToolRegistry;
use kubernetes_multicluster::infra::BinToolRegistry;

use crate::mocks::CountingRunner;

const SLOW_INSTALL: &str = "sleep 0.2; printf '#!/bin/sh\\n' > {bin_dir}/{bin_name}";

#[tokio::test]
async fn test_concurrent_installs_share_one_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = CountingRunner::default();
    let registry = BinToolRegistry::new(dir.path(), runner.clone())
        .await
        .expect("registry");

    let paths = join_all((0..8).map(|_| registry.install("kubectl", "1.30.0", SLOW_INSTALL))).await;

    assert_eq!(runner.count(), 1);
    for path in paths {
        assert_eq!(path.expect("install"), dir.path().join("kubectl-1.30.0"));
    }
}

#[tokio::test]
async fn test_distinct_versions_install_separately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let runner = CountingRunner::default();
    let registry = BinToolRegistry::new(dir.path(), runner.clone())
        .await
        .expect("registry");

    let (a, b) = tokio::join!(
        registry.install("helm", "3.14.0", SLOW_INSTALL),
        registry.install("helm", "3.15.0", SLOW_INSTALL),
    );
    assert_eq!(a.expect("3.14.0"), dir.path().join("helm-3.14.0"));
    assert_eq!(b.expect("3.15.0"), dir.path().join("helm-3.15.0"));
    assert_eq!(runner.count(), 2);

    registry.install("helm", "3.14.0", SLOW_INSTALL).await.expect("cached");
    assert_eq!(runner.count(), 2);
}

#[tokio::test]
async fn test_preinstalled_default_kubectl_is_used() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("kubectl"), b"").expect("write");
    let runner = CountingRunner::default();
    let registry = BinToolRegistry::new(dir.path(), runner.clone())
        .await
        .expect("registry");

    let path = registry.kubectl("").await.expect("kubectl");
    assert_eq!(path, dir.path().join("kubectl"));
    assert_eq!(runner.count(), 0);
}
