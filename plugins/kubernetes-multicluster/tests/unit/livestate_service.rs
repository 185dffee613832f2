//! Drift reports across deploy targets.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use kubernetes_multicluster::application::ports::ManifestLoader;
use kubernetes_multicluster::application::services::livestate::get_livestate;
use kubernetes_multicluster::application::services::sync::StagePorts;
use kubernetes_multicluster::domain::Manifest;
use kubernetes_multicluster::domain::spec::DeployTarget;
use kubernetes_multicluster::domain::sync_state::SyncStatus;

use crate::mocks::{FakeTools, RecordingKubectl, StaticLoader, deployment, source};

const COMMIT: &str = "0123456789abcdef";

const APP: &str = "\
kind: Application
spec:
  input:
    kubectlVersion: 1.27.0
";

const MANIFESTS: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: simple
  namespace: ns
spec:
  replicas: 2
---
apiVersion: v1
kind: Service
metadata:
  name: simple
  namespace: ns
spec:
  ports:
    - port: 9085
";

fn target(name: &str) -> DeployTarget {
    DeployTarget {
        name: name.into(),
        kube_config_path: format!("/kube/{name}"),
        kubectl_version: String::new(),
    }
}

/// Live objects as the cluster would return them after a clean sync, plus
/// fields the API server adds.
async fn synced_live(loader: &StaticLoader) -> Vec<Manifest> {
    let input = source(COMMIT, APP).loader_input(&deployment(), None);
    let mut live = loader.load_manifests(&input).await.expect("load");
    for m in &mut live {
        m.set_nested(&["metadata", "uid"], serde_json::json!("0b6ff4d1"));
    }
    loader.requests.lock().unwrap().clear();
    live
}

#[tokio::test]
async fn test_get_livestate_synced() {
    let loader = StaticLoader::default().with(COMMIT, MANIFESTS);
    let kubectl = RecordingKubectl {
        live: synced_live(&loader).await,
        ..RecordingKubectl::default()
    };
    let tools = FakeTools::default();
    let ports = StagePorts {
        kubectl: &kubectl,
        tools: &tools,
        loader: &loader,
    };

    let report = get_livestate(
        ports,
        &deployment(),
        &source(COMMIT, APP),
        &[target("c1"), target("c2")],
    )
    .await
    .expect("livestate");

    assert_eq!(report.sync_state.status, SyncStatus::Synced);
    assert!(report.sync_state.reason.is_empty());
    assert_eq!(report.live_state.resources.len(), 4);
    assert_eq!(report.live_state.resources[0].deploy_target, "c1");
    assert_eq!(report.live_state.resources[3].deploy_target, "c2");
    assert_eq!(*tools.kubectl_versions.lock().unwrap(), ["1.27.0", "1.27.0"]);
}

#[tokio::test]
async fn test_get_livestate_reports_drift_per_target() {
    let loader = StaticLoader::default().with(COMMIT, MANIFESTS);
    let mut live = synced_live(&loader).await;
    live.retain(|m| m.kind() == "Deployment");
    live[0].set_nested(&["spec", "replicas"], serde_json::json!(3));
    let kubectl = RecordingKubectl {
        live,
        ..RecordingKubectl::default()
    };
    let tools = FakeTools::default();
    let ports = StagePorts {
        kubectl: &kubectl,
        tools: &tools,
        loader: &loader,
    };

    let report = get_livestate(
        ports,
        &deployment(),
        &source(COMMIT, APP),
        &[target("c1"), target("c2")],
    )
    .await
    .expect("livestate");

    let state = report.sync_state;
    assert_eq!(state.status, SyncStatus::OutOfSync);
    assert_eq!(
        state.short_reason,
        "There are 2 manifests not synced (1 adds, 0 deletes, 1 changes)\n\
         There are 2 manifests not synced (1 adds, 0 deletes, 1 changes)"
    );
    assert!(state.reason.contains("at commit 0123456 and actual state in cluster: c1"));
    assert!(state.reason.contains("at commit 0123456 and actual state in cluster: c2"));
}

#[tokio::test]
async fn test_get_livestate_fails_when_a_target_fails() {
    let loader = StaticLoader::default().with(COMMIT, MANIFESTS);
    let kubectl = RecordingKubectl {
        failing_kubeconfigs: vec!["/kube/c2".into()],
        ..RecordingKubectl::default()
    };
    let ports = StagePorts {
        kubectl: &kubectl,
        tools: &FakeTools::default(),
        loader: &loader,
    };

    let err = get_livestate(
        ports,
        &deployment(),
        &source(COMMIT, APP),
        &[target("c1"), target("c2")],
    )
    .await
    .expect_err("c2 is unreachable");
    assert!(format!("{err:#}").contains("Failed to get live resources of c2"));
}
