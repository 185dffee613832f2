//! `Kubectl` port backed by the kubectl CLI.

use std::process::Output;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::application::ports::{Cluster, CommandRunner, Kubectl, Scope};
use crate::domain::error::KubernetesError;
use crate::domain::labels::{ANNOTATION_SERVER_SIDE_APPLY, USE_SERVER_SIDE_APPLY};
use crate::domain::manifest::{parse_manifests, Manifest};
use crate::domain::resource_key::ResourceKey;

const NOT_FOUND_LITERAL: &str = "Error from server (NotFound)";
const ALREADY_EXISTS_LITERAL: &str = "Error from server (AlreadyExists)";
const NOT_FOUND_SHORT: &str = "(NotFound)";

/// Runs kubectl through a [`CommandRunner`], one process per call.
#[derive(Debug, Clone, Default)]
pub struct KubectlCli<R> {
    runner: R,
}

impl<R: CommandRunner> KubectlCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn exec(&self, cluster: &Cluster, args: &[String], stdin: Option<&[u8]>) -> Result<Output> {
        let program = cluster.kubectl.to_string_lossy();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match stdin {
            Some(input) => self.runner.run_with_stdin(&program, &args, input).await,
            None => self.runner.run(&program, &args).await,
        }
    }

    async fn send_manifest(
        &self,
        cluster: &Cluster,
        namespace: &str,
        subcommand: &[&str],
        manifest: &Manifest,
    ) -> Result<Output> {
        let data = manifest.to_yaml()?;
        let mut args = global_flags(cluster, namespace);
        args.extend(subcommand.iter().map(|s| (*s).to_string()));
        args.extend(["-f".to_string(), "-".to_string()]);
        self.exec(cluster, &args, Some(data.as_bytes())).await
    }
}

/// `[--kubeconfig k] [--namespace n]`
fn global_flags(cluster: &Cluster, namespace: &str) -> Vec<String> {
    let mut args = Vec::with_capacity(8);
    if !cluster.kubeconfig.is_empty() {
        args.extend(["--kubeconfig".to_string(), cluster.kubeconfig.clone()]);
    }
    if !namespace.is_empty() {
        args.extend(["--namespace".to_string(), namespace.to_string()]);
    }
    args
}

fn combined(out: &Output) -> String {
    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));
    text
}

fn exec_error(command: &str, out: &Output) -> anyhow::Error {
    KubernetesError::KubectlExec {
        command: command.to_string(),
        stderr: combined(out).trim().to_string(),
    }
    .into()
}

/// Items of a `kind: List` document printed by `kubectl get -o yaml`.
fn parse_list(stdout: &[u8]) -> Result<Vec<Manifest>> {
    #[derive(Deserialize)]
    struct List {
        #[serde(default)]
        items: Vec<Value>,
    }
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list: List = serde_yaml::from_str(&text).context("decoding kubectl list output")?;
    list.items
        .into_iter()
        .map(|item| Manifest::from_value(item).map_err(Into::into))
        .collect()
}

impl<R: CommandRunner> Kubectl for KubectlCli<R> {
    async fn apply(&self, cluster: &Cluster, namespace: &str, manifest: &Manifest) -> Result<()> {
        let server_side =
            manifest.annotation(ANNOTATION_SERVER_SIDE_APPLY) == Some(USE_SERVER_SIDE_APPLY);
        let subcommand: &[&str] = if server_side {
            &["apply", "--server-side"]
        } else {
            &["apply"]
        };
        let out = self.send_manifest(cluster, namespace, subcommand, manifest).await?;
        if out.status.success() {
            return Ok(());
        }
        Err(exec_error("apply", &out))
    }

    async fn create(&self, cluster: &Cluster, namespace: &str, manifest: &Manifest) -> Result<()> {
        let out = self.send_manifest(cluster, namespace, &["create"], manifest).await?;
        if out.status.success() {
            return Ok(());
        }
        if combined(&out).contains(ALREADY_EXISTS_LITERAL) {
            return Err(KubernetesError::AlreadyExists(manifest.key().readable_string()).into());
        }
        Err(exec_error("create", &out))
    }

    async fn replace(&self, cluster: &Cluster, namespace: &str, manifest: &Manifest) -> Result<()> {
        let out = self.send_manifest(cluster, namespace, &["replace"], manifest).await?;
        if out.status.success() {
            return Ok(());
        }
        if combined(&out).contains(NOT_FOUND_LITERAL) {
            return Err(KubernetesError::NotFound(manifest.key().readable_string()).into());
        }
        Err(exec_error("replace", &out))
    }

    async fn force_replace(
        &self,
        cluster: &Cluster,
        namespace: &str,
        manifest: &Manifest,
    ) -> Result<()> {
        let out = self
            .send_manifest(cluster, namespace, &["replace", "--force"], manifest)
            .await?;
        if out.status.success() {
            return Ok(());
        }
        if combined(&out).contains(NOT_FOUND_LITERAL) {
            return Err(KubernetesError::NotFound(manifest.key().readable_string()).into());
        }
        Err(exec_error("replace --force", &out))
    }

    async fn delete(&self, cluster: &Cluster, namespace: &str, key: &ResourceKey) -> Result<()> {
        let mut args = global_flags(cluster, namespace);
        args.extend(["delete".to_string(), key.kind.clone(), key.name.clone()]);
        let out = self.exec(cluster, &args, None).await?;
        if combined(&out).contains(NOT_FOUND_SHORT) {
            return Err(KubernetesError::NotFound(key.readable_string()).into());
        }
        if out.status.success() {
            return Ok(());
        }
        Err(exec_error("delete", &out))
    }

    async fn get(&self, cluster: &Cluster, namespace: &str, key: &ResourceKey) -> Result<Manifest> {
        let mut args = global_flags(cluster, namespace);
        args.extend([
            "get".to_string(),
            key.kind.clone(),
            key.name.clone(),
            "-o".to_string(),
            "yaml".to_string(),
        ]);
        let out = self.exec(cluster, &args, None).await?;
        if combined(&out).contains(NOT_FOUND_SHORT) {
            return Err(KubernetesError::NotFound(key.readable_string()).into());
        }
        if !out.status.success() {
            return Err(exec_error("get", &out));
        }
        parse_manifests(&String::from_utf8_lossy(&out.stdout))?
            .into_iter()
            .next()
            .ok_or_else(|| KubernetesError::NotFound(key.readable_string()).into())
    }

    async fn api_resources(&self, cluster: &Cluster, namespaced: bool) -> Result<Vec<String>> {
        let mut args = vec![
            "api-resources".to_string(),
            format!("--namespaced={namespaced}"),
            "--verbs=list,get,delete".to_string(),
            "--output=name".to_string(),
        ];
        if !cluster.kubeconfig.is_empty() {
            args.extend(["--kubeconfig".to_string(), cluster.kubeconfig.clone()]);
        }
        let out = self.exec(cluster, &args, None).await?;
        if !out.status.success() {
            return Err(exec_error("api-resources", &out));
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn get_all(
        &self,
        cluster: &Cluster,
        scope: Scope<'_>,
        resources: &[String],
        selector: &str,
    ) -> Result<Vec<Manifest>> {
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        let mut args = vec![
            "get".to_string(),
            resources.join(","),
            "-o".to_string(),
            "yaml".to_string(),
            "--selector".to_string(),
            selector.to_string(),
        ];
        if !cluster.kubeconfig.is_empty() {
            args.extend(["--kubeconfig".to_string(), cluster.kubeconfig.clone()]);
        }
        match scope {
            Scope::AllNamespaces => args.push("--all-namespaces".to_string()),
            Scope::Namespace(ns) => args.extend(["--namespace".to_string(), ns.to_string()]),
            Scope::ClusterScoped => {}
        }

        let out = self.exec(cluster, &args, None).await?;
        // Warnings land on stderr; only stdout carries the list.
        if String::from_utf8_lossy(&out.stderr).contains(NOT_FOUND_SHORT) {
            return Ok(Vec::new());
        }
        if !out.status.success() {
            return Err(exec_error("get", &out));
        }
        parse_list(&out.stdout)
    }

    async fn create_namespace(&self, cluster: &Cluster, namespace: &str) -> Result<()> {
        let mut args = global_flags(cluster, "");
        args.extend(["create".to_string(), "namespace".to_string(), namespace.to_string()]);
        let out = self.exec(cluster, &args, None).await?;
        if combined(&out).contains(ALREADY_EXISTS_LITERAL) {
            return Err(KubernetesError::AlreadyExists(format!("namespace {namespace}")).into());
        }
        if out.status.success() {
            return Ok(());
        }
        Err(exec_error("create namespace", &out))
    }
}
