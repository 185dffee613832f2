//! Process supervisor: implements `Supervisor` with `tokio::process`.
//!
//! A background task owns the child and publishes its exit through a watch
//! channel. The channel holding `None` means the process is still running.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{oneshot, watch};

use crate::application::ports::{AgentRun, CommandRunner, Supervisor};

type ExitResult = Result<ExitStatus, String>;

/// Starts children with inherited stdio. Termination signals are sent with
/// `kill -TERM` through `runner`.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor<R> {
    runner: R,
}

impl<R> ProcessSupervisor<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner + Clone> Supervisor for ProcessSupervisor<R> {
    type Run = ChildProcess<R>;

    async fn start(&self, path: &Path, args: &[String]) -> Result<ChildProcess<R>> {
        let mut child = tokio::process::Command::new(path)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", path.display()))?;
        let pid = child
            .id()
            .with_context(|| format!("{} exited before its pid was read", path.display()))?;

        let (stopped_tx, stopped) = watch::channel(None);
        let (kill, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let result = tokio::select! {
                status = child.wait() => status,
                Ok(()) = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(pid, error = %e, "failed to kill process");
                    }
                    child.wait().await
                }
            };
            let _ = stopped_tx.send(Some(result.map_err(|e| e.to_string())));
        });

        tracing::debug!(pid, path = %path.display(), "started process");
        Ok(ChildProcess {
            pid,
            runner: self.runner.clone(),
            stopped,
            kill,
        })
    }
}

/// A child started by [`ProcessSupervisor`].
pub struct ChildProcess<R> {
    pid: u32,
    runner: R,
    stopped: watch::Receiver<Option<ExitResult>>,
    kill: oneshot::Sender<()>,
}

impl<R> ChildProcess<R> {
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait until the child has exited and return how it ended.
    pub async fn wait(&mut self) -> ExitResult {
        wait_exit(&mut self.stopped).await
    }
}

async fn wait_exit(stopped: &mut watch::Receiver<Option<ExitResult>>) -> ExitResult {
    match stopped.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or_else(|| Err("no exit status".into())),
        Err(_) => Err("process watcher stopped".into()),
    }
}

impl<R: CommandRunner> AgentRun for ChildProcess<R> {
    fn is_running(&self) -> bool {
        self.stopped.borrow().is_none()
    }

    async fn graceful_stop(self, period: Duration) -> Result<()> {
        let running = self.is_running();
        let Self {
            pid,
            runner,
            mut stopped,
            kill,
        } = self;

        if running {
            let pid_arg = pid.to_string();
            match runner.run("kill", &["-TERM", &pid_arg]).await {
                Ok(out) if !out.status.success() => tracing::debug!(
                    pid,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "kill -TERM failed"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(pid, error = %e, "failed to send SIGTERM"),
            }
        }

        if let Ok(result) = tokio::time::timeout(period, wait_exit(&mut stopped)).await {
            return match result {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => anyhow::bail!("process {pid} exited with {status}"),
                Err(e) => anyhow::bail!("failed to wait for process {pid}: {e}"),
            };
        }

        tracing::warn!(pid, ?period, "grace period elapsed, killing process");
        let _ = kill.send(());
        let _ = wait_exit(&mut stopped).await;
        Ok(())
    }
}
