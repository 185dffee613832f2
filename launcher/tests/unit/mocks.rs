//! Shared fakes for launcher unit tests.
//!
//! Every fake is `Clone` and shares its state through `Arc`, so a test keeps
//! a handle after moving the port into the [`Launcher`].
//!
//! [`Launcher`]: piped_launcher::application::services::Launcher

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use piped_launcher::application::ports::{
    AgentRun, BinaryDownloader, ConfigSource, ControlPlane, LocalFs, OciRegistry, Supervisor,
};
use piped_launcher::domain::ControlPlaneEndpoint;
use piped_launcher::domain::oci::{Descriptor, OciReference};

// ── Config helpers ────────────────────────────────────────────────────────────

/// A valid piped config with an inline key; `extra` is appended to the spec
/// so tests can produce distinct configs.
pub fn piped_config(extra: &str) -> Vec<u8> {
    format!(
        "apiVersion: pipecd.dev/v1beta1\n\
         kind: Piped\n\
         spec:\n  \
           apiAddress: control-plane.example.com:443\n  \
           projectID: quickstart\n  \
           pipedID: piped-1\n  \
           pipedKeyData: {}\n{extra}",
        STANDARD.encode("secret-key")
    )
    .into_bytes()
}

// ── Config source ─────────────────────────────────────────────────────────────

/// Returns whatever bytes are stored; `None` makes `load` fail.
#[derive(Clone)]
pub struct FakeConfig {
    pub data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl FakeConfig {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(Some(data))),
        }
    }

    pub fn set(&self, data: Option<Vec<u8>>) {
        *self.data.lock().unwrap() = data;
    }
}

impl ConfigSource for FakeConfig {
    async fn load(&self) -> Result<Vec<u8>> {
        match self.data.lock().unwrap().clone() {
            Some(data) => Ok(data),
            None => anyhow::bail!("secret store unavailable"),
        }
    }
}

// ── Control plane ─────────────────────────────────────────────────────────────

/// Answers with the stored version; `None` makes the call fail.
#[derive(Clone)]
pub struct FakeControlPlane {
    pub version: Arc<Mutex<Option<String>>>,
    pub calls: Arc<Mutex<Vec<ControlPlaneEndpoint>>>,
}

impl FakeControlPlane {
    pub fn new(version: &str) -> Self {
        Self {
            version: Arc::new(Mutex::new(Some(version.to_string()))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set(&self, version: Option<&str>) {
        *self.version.lock().unwrap() = version.map(ToString::to_string);
    }
}

impl ControlPlane for FakeControlPlane {
    async fn desired_version(&self, endpoint: &ControlPlaneEndpoint) -> Result<String> {
        self.calls.lock().unwrap().push(endpoint.clone());
        match self.version.lock().unwrap().clone() {
            Some(v) => Ok(v),
            None => anyhow::bail!("connection refused"),
        }
    }
}

/// Never answers.
pub struct HangingControlPlane;

impl ControlPlane for HangingControlPlane {
    async fn desired_version(&self, _: &ControlPlaneEndpoint) -> Result<String> {
        std::future::pending().await
    }
}

// ── Downloader ────────────────────────────────────────────────────────────────

/// Records every URL and hands back the destination path.
#[derive(Clone, Default)]
pub struct FakeDownloader {
    pub urls: Arc<Mutex<Vec<String>>>,
    pub fail: Arc<AtomicBool>,
}

impl BinaryDownloader for FakeDownloader {
    async fn download(&self, url: &str, dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
        self.urls.lock().unwrap().push(url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("404 Not Found");
        }
        Ok(dest_dir.join(file_name))
    }
}

// ── Filesystem ────────────────────────────────────────────────────────────────

/// In-memory files and directories. Never yields, so paused-clock tests do
/// not race blocking filesystem work.
#[derive(Clone, Default)]
pub struct MemoryFs {
    pub files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    pub dirs: Arc<Mutex<Vec<PathBuf>>>,
}

impl MemoryFs {
    pub fn file(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn has_dir(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().iter().any(|d| d.starts_with(path))
    }
}

impl LocalFs for MemoryFs {
    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.file(path)
            .ok_or_else(|| anyhow::anyhow!("{} does not exist", path.display()))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.dirs.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.files.lock().unwrap().retain(|p, _| !p.starts_with(path));
        self.dirs.lock().unwrap().retain(|d| !d.starts_with(path));
        Ok(())
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Observable state of one fake piped.
#[derive(Clone, Default)]
pub struct RunHandle {
    pub alive: Arc<AtomicBool>,
    pub stopped_with: Arc<Mutex<Option<Duration>>>,
}

impl RunHandle {
    /// Pretend the process exited on its own.
    pub fn crash(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn stop_period(&self) -> Option<Duration> {
        *self.stopped_with.lock().unwrap()
    }
}

pub struct FakeRun {
    handle: RunHandle,
}

impl AgentRun for FakeRun {
    fn is_running(&self) -> bool {
        self.handle.alive.load(Ordering::SeqCst)
    }

    async fn graceful_stop(self, period: Duration) -> Result<()> {
        self.handle.alive.store(false, Ordering::SeqCst);
        *self.handle.stopped_with.lock().unwrap() = Some(period);
        Ok(())
    }
}

/// Records each start; the first `failures` starts fail.
#[derive(Clone, Default)]
pub struct FakeSupervisor {
    pub starts: Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>,
    pub runs: Arc<Mutex<Vec<RunHandle>>>,
    pub failures: Arc<AtomicU32>,
    pub attempts: Arc<AtomicUsize>,
}

impl FakeSupervisor {
    pub fn failing(failures: u32) -> Self {
        let sup = Self::default();
        sup.failures.store(failures, Ordering::SeqCst);
        sup
    }

    pub fn last_run(&self) -> RunHandle {
        self.runs.lock().unwrap().last().cloned().expect("a started piped")
    }

    pub fn started(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn last_args(&self) -> Vec<String> {
        self.starts.lock().unwrap().last().map(|(_, a)| a.clone()).expect("a start")
    }
}

impl Supervisor for FakeSupervisor {
    type Run = FakeRun;

    async fn start(&self, path: &Path, args: &[String]) -> Result<FakeRun> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("exec format error");
        }
        self.starts
            .lock()
            .unwrap()
            .push((path.to_path_buf(), args.to_vec()));
        let handle = RunHandle::default();
        handle.alive.store(true, Ordering::SeqCst);
        self.runs.lock().unwrap().push(handle.clone());
        Ok(FakeRun { handle })
    }
}

// ── OCI registry ──────────────────────────────────────────────────────────────

/// In-memory registry keyed by repository path.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    pub blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub manifests: Arc<Mutex<HashMap<String, (String, Vec<u8>)>>>,
    pub blob_pushes: Arc<AtomicUsize>,
}

fn key(repo: &OciReference, reference: &str) -> String {
    format!("{}/{}@{reference}", repo.registry, repo.repository)
}

impl MemoryRegistry {
    /// Replace a stored blob, keeping its digest key.
    pub fn corrupt_blob(&self, digest: &str, data: &[u8]) {
        for (k, v) in self.blobs.lock().unwrap().iter_mut() {
            if k.ends_with(digest) {
                *v = data.to_vec();
            }
        }
    }
}

impl OciRegistry for MemoryRegistry {
    async fn fetch_manifest(&self, repo: &OciReference, reference: &str) -> Result<(String, Vec<u8>)> {
        self.manifests
            .lock()
            .unwrap()
            .get(&key(repo, reference))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("manifest {reference} not found"))
    }

    async fn fetch_blob(&self, repo: &OciReference, digest: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&key(repo, digest))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("blob {digest} not found"))
    }

    async fn push_blob(&self, repo: &OciReference, descriptor: &Descriptor, data: &[u8]) -> Result<()> {
        self.blob_pushes.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap()
            .insert(key(repo, &descriptor.digest().to_string()), data.to_vec());
        Ok(())
    }

    async fn push_manifest(
        &self,
        repo: &OciReference,
        reference: &str,
        media_type: &str,
        data: &[u8],
    ) -> Result<()> {
        self.manifests
            .lock()
            .unwrap()
            .insert(key(repo, reference), (media_type.to_string(), data.to_vec()));
        Ok(())
    }
}
