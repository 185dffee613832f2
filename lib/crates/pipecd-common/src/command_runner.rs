//! Process execution port and its tokio implementation.
//!
//! Every external tool the launcher and plugins drive (kubectl, helm,
//! kustomize, git, install scripts) goes through [`CommandRunner`] so that
//! services can be exercised against canned outputs in tests.

use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// ── Port ──────────────────────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with `dir` as its working directory.
    async fn run_in_dir(&self, dir: &Path, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with extra environment variables.
    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
    /// Run a program with inherited stdio and return only its exit status.
    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus>;
}

// ── Tokio implementation ──────────────────────────────────────────────────────

/// Production `CommandRunner` backed by `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, so dropping a pending call
/// (for instance when the caller's cancellation token fires) terminates the
/// process instead of leaving it orphaned. An optional timeout kills the
/// child explicitly.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner {
    timeout: Option<Duration>,
}

impl TokioCommandRunner {
    /// A runner whose calls inherit their deadline from the caller.
    #[must_use]
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// A runner that kills any child still running after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    async fn execute(
        &self,
        program: &str,
        mut command: tokio::process::Command,
        input: Option<&[u8]>,
    ) -> Result<Output> {
        if input.is_some() {
            command.stdin(Stdio::piped());
        }
        let mut child = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let stdin_task = input.map(|bytes| {
            let stdin_handle = child.stdin.take();
            let owned = bytes.to_vec();
            tokio::spawn(async move {
                if let Some(mut stdin) = stdin_handle {
                    let _ = stdin.write_all(&owned).await;
                }
            })
        });

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        let collect = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stdout_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stderr_handle {
                        let _ = h.read_to_end(&mut buf).await;
                    }
                    buf
                },
            );
            if let Some(task) = stdin_task {
                let _ = task.await;
            }
            Ok(Output {
                status: status.with_context(|| format!("waiting for {program}"))?,
                stdout,
                stderr,
            })
        };

        let Some(timeout) = self.timeout else {
            return collect.await;
        };
        tokio::select! {
            result = collect => result,
            () = tokio::time::sleep(timeout) => {
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        let mut command = tokio::process::Command::new(program);
        command.args(args);
        self.execute(program, command, None).await
    }

    async fn run_in_dir(&self, dir: &Path, program: &str, args: &[&str]) -> Result<Output> {
        let mut command = tokio::process::Command::new(program);
        command.args(args).current_dir(dir);
        self.execute(program, command, None).await
    }

    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, &str)],
    ) -> Result<Output> {
        let mut command = tokio::process::Command::new(program);
        command.args(args).envs(envs.iter().copied());
        self.execute(program, command, None).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output> {
        let mut command = tokio::process::Command::new(program);
        command.args(args);
        self.execute(program, command, Some(stdin)).await
    }

    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        child
            .wait()
            .await
            .with_context(|| format!("waiting for {program}"))
    }
}
