//! Stage execution against recorded kubectl calls.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::Ordering;

use kubernetes_multicluster::application::services::sync::{StagePorts, execute_stage};
use kubernetes_multicluster::domain::deployment::{ExecuteStageInput, StageStatus};
use kubernetes_multicluster::domain::pipeline::StageName;
use kubernetes_multicluster::domain::spec::DeployTarget;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::mocks::{
    FakeTools, MockLogSink, RecordingKubectl, RecordingLogPersister, StaticLoader, deployment,
    manifest, source,
};

const COMMIT: &str = "0123456789";
const RUNNING_COMMIT: &str = "9876543210";

const APP: &str = "\
kind: Application
spec:
  input:
    namespace: ns
";

const APP_WITH_PRUNE: &str = "\
kind: Application
spec:
  input:
    namespace: ns
  quickSync:
    prune: true
";

const MANIFESTS: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: simple
spec:
  selector:
    matchLabels:
      app: simple
  template:
    metadata:
      labels:
        app: simple
    spec:
      containers:
        - name: helloworld
          image: gcr.io/pipecd/helloworld:v0.1.0
---
apiVersion: v1
kind: Service
metadata:
  name: simple
spec:
  selector:
    app: simple
";

fn targets() -> Vec<DeployTarget> {
    ["c1", "c2"]
        .iter()
        .map(|name| DeployTarget {
            name: (*name).to_string(),
            kube_config_path: format!("/kube/{name}"),
            kubectl_version: String::new(),
        })
        .collect()
}

fn input(stage: StageName, app: &str) -> ExecuteStageInput {
    ExecuteStageInput {
        deployment: deployment(),
        stage_name: stage,
        stage_config: None,
        target_source: source(COMMIT, app),
        running_source: Some(source(RUNNING_COMMIT, app)),
    }
}

fn loader() -> StaticLoader {
    StaticLoader::default()
        .with(COMMIT, MANIFESTS)
        .with(RUNNING_COMMIT, MANIFESTS)
}

async fn run(
    kubectl: &RecordingKubectl,
    tools: &FakeTools,
    loader: &StaticLoader,
    input: &ExecuteStageInput,
    lp: &RecordingLogPersister,
) -> StageStatus {
    let ports = StagePorts {
        kubectl,
        tools,
        loader,
    };
    execute_stage(ports, input, &targets(), lp, &CancellationToken::new()).await
}

// ── Forward sync ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sync_applies_to_every_target() {
    let kubectl = RecordingKubectl::default();
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &loader(),
        &input(StageName::K8sMultiSync, APP),
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    assert_eq!(kubectl.applies.load(Ordering::SeqCst), 4);
    for kubeconfig in ["/kube/c1", "/kube/c2"] {
        let calls = kubectl.calls_for(kubeconfig);
        assert_eq!(calls.len(), 2, "{kubeconfig}");
        assert!(calls.iter().all(|c| c.verb == "apply" && c.namespace == "ns"));
    }
    assert!(lp.contains("Start syncing the deployment to the target c1"));
    assert!(lp.contains("Loading manifests at commit 0123456789 for handling"));
    assert!(lp.contains("Successfully applied 2 manifests"));
    assert!(lp.contains("Resource GC was skipped because sync.prune was not configured"));
    assert!(lp.contains("target c2, status: SUCCESS"));
}

#[tokio::test]
async fn test_sync_fails_when_any_target_fails() {
    let kubectl = RecordingKubectl {
        failing_kubeconfigs: vec!["/kube/c2".into()],
        ..RecordingKubectl::default()
    };
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &loader(),
        &input(StageName::K8sMultiSync, APP),
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Failure);
    // The healthy target is not cancelled by its failing peer.
    assert_eq!(kubectl.calls_for("/kube/c1").len(), 2);
    assert!(lp.contains("target c1, status: SUCCESS"));
    assert!(lp.contains("target c2, status: FAILURE"));
    assert!(
        lp.errors()
            .iter()
            .any(|e| e.starts_with("Failed while applying manifests"))
    );
}

#[tokio::test]
async fn test_sync_fails_when_kubectl_cannot_be_installed() {
    let tools = FakeTools {
        fail_kubectl: true,
        ..FakeTools::default()
    };
    let lp = RecordingLogPersister::default();
    let kubectl = RecordingKubectl::default();
    let status = run(&kubectl, &tools, &loader(), &input(StageName::K8sMultiSync, APP), &lp).await;

    assert_eq!(status, StageStatus::Failure);
    assert!(kubectl.verbs().is_empty());
    assert!(lp.errors().iter().any(|e| e.contains("Failed while getting kubectl tool")));
}

#[tokio::test]
async fn test_sync_resolves_multi_targets() {
    let app = "\
kind: Application
spec:
  input:
    kubectlVersion: 1.29.0
    multiTargets:
      - target:
          name: c1
        kubectlVersion: 1.30.0
        manifests: [c1/deployment.yaml]
      - target:
          name: c9
";
    let kubectl = RecordingKubectl::default();
    let tools = FakeTools::default();
    let loader = loader();
    let lp = RecordingLogPersister::default();
    let status = run(&kubectl, &tools, &loader, &input(StageName::K8sMultiSync, app), &lp).await;

    assert_eq!(status, StageStatus::Success);
    assert!(lp.contains("Ignore multi target 'c9': not matched any deployTarget"));
    assert!(kubectl.calls_for("/kube/c2").is_empty());
    assert_eq!(*tools.kubectl_versions.lock().unwrap(), ["1.30.0"]);
    let requests = loader.requests.lock().unwrap();
    assert_eq!(requests[0].manifests, ["c1/deployment.yaml"]);
}

#[tokio::test]
async fn test_sync_by_replace_falls_back_to_create() {
    let manifests = "\
apiVersion: batch/v1
kind: Job
metadata:
  name: migrate
  annotations:
    pipecd.dev/sync-by-replace: enabled
---
apiVersion: batch/v1
kind: Job
metadata:
  name: seed
  annotations:
    pipecd.dev/force-sync-by-replace: enabled
";
    let kubectl = RecordingKubectl {
        missing: vec!["migrate".into()],
        ..RecordingKubectl::default()
    };
    let loader = StaticLoader::default().with(COMMIT, manifests);
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &loader,
        &input(StageName::K8sMultiSync, APP),
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    let verbs: Vec<_> = kubectl
        .calls_for("/kube/c1")
        .into_iter()
        .map(|c| (c.verb, c.target))
        .collect();
    assert_eq!(
        verbs,
        [
            ("replace", "migrate".to_string()),
            ("create", "migrate".to_string()),
            ("force_replace", "seed".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_sync_auto_create_namespace_tolerates_existing() {
    let app = "\
kind: Application
spec:
  input:
    namespace: test-namespace
    autoCreateNamespace: true
";
    let kubectl = RecordingKubectl {
        namespace_exists: true,
        ..RecordingKubectl::default()
    };
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &loader(),
        &input(StageName::K8sMultiSync, app),
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    let calls = kubectl.calls_for("/kube/c1");
    assert_eq!(calls[0].verb, "create_namespace");
    assert_eq!(calls[0].target, "test-namespace");
    assert_eq!(calls[1].namespace, "test-namespace");
}

#[tokio::test]
async fn test_sync_selector_conflict_fails_stage() {
    let manifests = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: simple
spec:
  selector:
    matchLabels:
      pipecd.dev/variant: canary
  template:
    metadata:
      labels:
        pipecd.dev/variant: canary
";
    let mut stage = input(StageName::K8sMultiSync, APP);
    stage.stage_config = Some(json!({"addVariantLabelToSelector": true}));
    let kubectl = RecordingKubectl::default();
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &StaticLoader::default().with(COMMIT, manifests),
        &stage,
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Failure);
    assert!(kubectl.verbs().is_empty());
    assert!(
        lp.errors()
            .iter()
            .any(|e| e.contains("Unable to check/set \"pipecd.dev/variant: primary\""))
    );
}

#[tokio::test]
async fn test_sync_rejects_malformed_stage_options() {
    let mut stage = input(StageName::K8sMultiSync, APP);
    stage.stage_config = Some(json!({"prune": "yes"}));
    let kubectl = RecordingKubectl::default();
    let lp = RecordingLogPersister::default();
    let status = run(&kubectl, &FakeTools::default(), &loader(), &stage, &lp).await;

    assert_eq!(status, StageStatus::Failure);
    assert!(kubectl.verbs().is_empty());
}

// ── Prune ─────────────────────────────────────────────────────────────────────

fn live_objects() -> Vec<kubernetes_multicluster::domain::Manifest> {
    vec![
        manifest("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: simple\n  namespace: ns\n"),
        manifest("apiVersion: v1\nkind: Service\nmetadata:\n  name: simple\n  namespace: ns\n"),
        manifest("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: old\n  namespace: ns\n"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_sync_prunes_resources_removed_from_git() {
    let kubectl = RecordingKubectl {
        live: live_objects(),
        ..RecordingKubectl::default()
    };
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &loader(),
        &input(StageName::K8sMultiSync, APP_WITH_PRUNE),
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    let deletes: Vec<_> = kubectl
        .calls_for("/kube/c1")
        .into_iter()
        .filter(|c| c.verb == "delete")
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].target, "old");
    assert_eq!(deletes[0].namespace, "ns");
    assert!(lp.contains("Waiting for the applied manifests to be stable"));
    assert!(lp.contains("Successfully loaded 3 live resources"));
    assert!(lp.contains("Start pruning 1 resources"));
    assert!(lp.contains("Successfully deleted 1 resources"));
}

#[tokio::test(start_paused = true)]
async fn test_prune_skips_missing_resources() {
    let kubectl = RecordingKubectl {
        live: live_objects(),
        missing: vec!["old".into()],
        ..RecordingKubectl::default()
    };
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &loader(),
        &input(StageName::K8sMultiSync, APP_WITH_PRUNE),
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    assert!(lp.contains("Specified resource does not exist, so skip deleting the resource"));
    assert!(lp.contains("Successfully deleted 0 resources"));
}

#[tokio::test(start_paused = true)]
async fn test_prune_without_live_resources() {
    let kubectl = RecordingKubectl::default();
    let lp = RecordingLogPersister::default();
    run(
        &kubectl,
        &FakeTools::default(),
        &loader(),
        &input(StageName::K8sMultiSync, APP_WITH_PRUNE),
        &lp,
    )
    .await;

    assert!(lp.contains("There is no data about live resource so no resource will be removed"));
    assert!(!kubectl.verbs().contains(&"delete"));
}

#[tokio::test]
async fn test_cancelled_stage_fails() {
    let kubectl = RecordingKubectl::default();
    let lp = RecordingLogPersister::default();
    let token = CancellationToken::new();
    token.cancel();
    let ports = StagePorts {
        kubectl: &kubectl,
        tools: &FakeTools::default(),
        loader: &loader(),
    };
    let status = execute_stage(
        ports,
        &input(StageName::K8sMultiSync, APP_WITH_PRUNE),
        &targets(),
        &lp,
        &token,
    )
    .await;

    assert_eq!(status, StageStatus::Failure);
    assert!(lp.errors().iter().any(|e| e.contains("operation cancelled")));
}

// ── Rollback ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rollback_succeeds_when_one_target_succeeds() {
    let kubectl = RecordingKubectl {
        failing_kubeconfigs: vec!["/kube/c1".into()],
        ..RecordingKubectl::default()
    };
    let loader = loader();
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &loader,
        &input(StageName::K8sMultiRollback, APP),
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Success);
    assert!(lp.contains("Start rolling back the deployment for the target c2"));
    assert!(lp.contains("Loading manifests at commit 9876543210 for handling"));
    assert!(lp.contains("target c1, status: FAILURE"));
    assert!(lp.contains("target c2, status: SUCCESS"));
    assert!(
        loader
            .requests
            .lock()
            .unwrap()
            .iter()
            .all(|r| r.commit_hash == RUNNING_COMMIT)
    );
}

#[tokio::test]
async fn test_rollback_fails_when_every_target_fails() {
    let kubectl = RecordingKubectl {
        failing_kubeconfigs: vec!["/kube/c1".into(), "/kube/c2".into()],
        ..RecordingKubectl::default()
    };
    let lp = RecordingLogPersister::default();
    let status = run(
        &kubectl,
        &FakeTools::default(),
        &loader(),
        &input(StageName::K8sMultiRollback, APP),
        &lp,
    )
    .await;

    assert_eq!(status, StageStatus::Failure);
}

#[tokio::test]
async fn test_rollback_without_previous_deployment() {
    let mut stage = input(StageName::K8sMultiRollback, APP);
    stage.running_source = None;
    let kubectl = RecordingKubectl::default();
    let lp = RecordingLogPersister::default();
    let status = run(&kubectl, &FakeTools::default(), &loader(), &stage, &lp).await;

    assert_eq!(status, StageStatus::Failure);
    assert!(kubectl.verbs().is_empty());
    assert_eq!(
        lp.errors(),
        ["Unable to determine the last deployed commit to rollback. It seems this is the first deployment."]
    );

    let mut stage = input(StageName::K8sMultiRollback, APP);
    stage.running_source = Some(source("", APP));
    let status = run(&kubectl, &FakeTools::default(), &loader(), &stage, &lp).await;
    assert_eq!(status, StageStatus::Failure);
}

#[tokio::test]
async fn test_rollback_without_previous_deployment_logs_single_error() {
    let mut lp = MockLogSink::new();
    lp.expect_error()
        .withf(|message| message.starts_with("Unable to determine the last deployed commit"))
        .times(1)
        .return_const(());
    lp.expect_info().never();
    lp.expect_success().never();

    let mut stage = input(StageName::K8sMultiRollback, APP);
    stage.running_source = None;
    let kubectl = RecordingKubectl::default();
    let ports = StagePorts {
        kubectl: &kubectl,
        tools: &FakeTools::default(),
        loader: &loader(),
    };
    let status = execute_stage(ports, &stage, &targets(), &lp, &CancellationToken::new()).await;
    assert_eq!(status, StageStatus::Failure);
}
