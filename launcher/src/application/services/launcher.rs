//! Application service: keep one piped running at the desired state.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Every check loads the config, asks the control plane for the version and
//! relaunches piped when either drifted or the process died.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pipecd_common::Cancelled;
use pipecd_common::cancel::{run_until_cancelled, sleep};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AgentRun, BinaryDownloader, ConfigSource, ControlPlane, LocalFs, Supervisor,
};
use crate::application::services::desired_state::fetch_desired_state;
use crate::domain::args::make_piped_args;
use crate::domain::release::{
    PIPED_BINARY_NAME, PIPED_CONFIG_FILE_NAME, Platform, make_download_url,
};
use crate::domain::{DesiredState, LauncherError, Relaunch};

/// Attempts made to start piped before a launch is given up.
pub const START_ATTEMPTS: u32 = 3;
/// Pause between two start attempts.
pub const START_BACKOFF: Duration = Duration::from_secs(5);

/// Everything the loop needs besides its ports.
#[derive(Debug, Clone)]
pub struct LauncherOptions {
    pub home_dir: PathBuf,
    pub default_version: String,
    pub download_url_template: String,
    pub check_interval: Duration,
    pub grace_period: Duration,
    /// The launcher's own arguments, without the program name.
    pub args: Vec<String>,
    pub launcher_version: String,
    pub platform: Platform,
}

/// The ports driven by [`Launcher`].
pub struct LauncherPorts<C, P, D, S, F> {
    pub config: C,
    pub control_plane: P,
    pub downloader: D,
    pub supervisor: S,
    pub fs: F,
}

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    UpToDate,
    Relaunched { version: String },
}

/// The reconciliation loop and the piped it owns.
///
/// At most one piped exists at a time. `running` and `running_state` are
/// both set after a successful launch and both cleared by a stop.
pub struct Launcher<C, P, D, S: Supervisor, F> {
    ports: LauncherPorts<C, P, D, S, F>,
    options: LauncherOptions,
    running: Option<S::Run>,
    running_state: Option<DesiredState>,
}

impl<C, P, D, S, F> Launcher<C, P, D, S, F>
where
    C: ConfigSource,
    P: ControlPlane,
    D: BinaryDownloader,
    S: Supervisor,
    F: LocalFs,
{
    #[must_use]
    pub fn new(ports: LauncherPorts<C, P, D, S, F>, options: LauncherOptions) -> Self {
        Self {
            ports,
            options,
            running: None,
            running_state: None,
        }
    }

    /// Directory holding the binary and config of the running piped.
    #[must_use]
    pub fn working_dir(&self) -> PathBuf {
        self.options.home_dir.join("piped")
    }

    #[must_use]
    pub fn running_version(&self) -> Option<&str> {
        self.running_state.as_ref().map(|s| s.version.as_str())
    }

    #[must_use]
    pub fn is_piped_running(&self) -> bool {
        self.running.as_ref().is_some_and(AgentRun::is_running)
    }

    /// Check once immediately, then every `check_interval` until `token`
    /// fires. On cancellation the running piped is stopped and its working
    /// directory removed.
    ///
    /// # Errors
    ///
    /// Returns the error of the first check, or a cleanup failure on
    /// shutdown. Later check failures are logged and retried.
    pub async fn run(mut self, token: &CancellationToken) -> Result<()> {
        if let Err(e) = self.tick(token).await
            && e.downcast_ref::<Cancelled>().is_none()
        {
            tracing::error!(error = %format!("{e:#}"), "failed while launching the first piped");
            return Err(e);
        }

        let period = self.options.check_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while !token.is_cancelled() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(token).await {
                        tracing::error!(
                            version = self.running_version().unwrap_or_default(),
                            error = %format!("{e:#}"),
                            "failed while reconciling piped"
                        );
                    }
                }
                () = token.cancelled() => {}
            }
        }

        tracing::info!("shutting down, stopping piped");
        self.clean_old_piped()
            .await
            .inspect_err(|e| tracing::error!(error = %format!("{e:#}"), "failed while cleaning old piped"))
    }

    /// Reconcile once.
    ///
    /// # Errors
    ///
    /// Returns an error when the desired state cannot be fetched, the old
    /// piped cannot be cleaned or the new one cannot be launched. A failed
    /// fetch leaves the running piped untouched.
    pub async fn tick(&mut self, token: &CancellationToken) -> Result<TickOutcome> {
        let desired = run_until_cancelled(
            token,
            fetch_desired_state(
                &self.ports.config,
                &self.ports.control_plane,
                &self.ports.fs,
                &self.options.default_version,
                &self.options.launcher_version,
            ),
        )
        .await?
        .context("failed while checking desired version and config")?;

        match Relaunch::decide(self.running_state.as_ref(), &desired, self.is_piped_running()) {
            Relaunch::UpToDate => {
                tracing::info!(version = %desired.version, "everything up-to-date");
                return Ok(TickOutcome::UpToDate);
            }
            Relaunch::NotRunning if self.running.is_some() => {
                tracing::warn!("it seems the launched piped has stopped unexpectedly");
            }
            Relaunch::NotRunning | Relaunch::Changed => {}
        }
        tracing::info!(
            from = self.running_version().unwrap_or("none"),
            to = %desired.version,
            "will relaunch a new piped because some changes in version/config were detected"
        );

        self.clean_old_piped()
            .await
            .context("failed while cleaning old piped")?;
        let run = self
            .launch_new_piped(&desired, token)
            .await
            .context("failed while launching new piped")?;

        let version = desired.version.clone();
        self.running = Some(run);
        self.running_state = Some(desired);
        tracing::info!(%version, "successfully launched a new piped");
        Ok(TickOutcome::Relaunched { version })
    }

    /// Stop the running piped, if any, and remove the working directory.
    ///
    /// A failed stop is only logged: the process is gone either way.
    async fn clean_old_piped(&mut self) -> Result<()> {
        self.running_state = None;
        if let Some(run) = self.running.take() {
            if let Err(e) = run.graceful_stop(self.options.grace_period).await {
                tracing::warn!(error = %format!("{e:#}"), "received an error while shutting down old piped");
            }
            tracing::info!("piped has been stopped");
        }

        let dir = self.working_dir();
        self.ports
            .fs
            .remove_dir_all(&dir)
            .await
            .with_context(|| format!("could not clean working directory {}", dir.display()))
    }

    async fn launch_new_piped(
        &self,
        desired: &DesiredState,
        token: &CancellationToken,
    ) -> Result<S::Run> {
        let work = self.working_dir();
        self.ports
            .fs
            .create_dir_all(&work)
            .await
            .with_context(|| format!("could not create working directory {}", work.display()))?;

        let bin_dir = work.join("bin");
        let url = make_download_url(
            &self.options.download_url_template,
            &desired.version,
            &self.options.platform.os,
        );
        let piped = run_until_cancelled(
            token,
            self.ports.downloader.download(&url, &bin_dir, PIPED_BINARY_NAME),
        )
        .await?
        .map_err(|e| LauncherError::Download {
            url: url.clone(),
            reason: format!("{e:#}"),
        })?;
        tracing::info!(%url, path = %piped.display(), "downloaded piped binary");

        let config_dir = work.join("config");
        let config_path = config_dir.join(PIPED_CONFIG_FILE_NAME);
        self.ports
            .fs
            .create_dir_all(&config_dir)
            .await
            .with_context(|| format!("failed to create directory {}", config_dir.display()))?;
        self.ports
            .fs
            .write(&config_path, &desired.config)
            .await
            .with_context(|| {
                format!("failed to write piped config data to file at {}", config_path.display())
            })?;
        tracing::info!(path = %config_path.display(), "wrote piped config");

        let args = make_piped_args(
            &self.options.args,
            &config_path.display().to_string(),
            &self.options.launcher_version,
        );
        tracing::info!(version = %desired.version, ?args, "start running piped");
        self.start_with_retry(&piped, &args, token).await
    }

    async fn start_with_retry(
        &self,
        path: &Path,
        args: &[String],
        token: &CancellationToken,
    ) -> Result<S::Run> {
        let mut reason = String::new();
        for attempt in 1..=START_ATTEMPTS {
            match self.ports.supervisor.start(path, args).await {
                Ok(run) => return Ok(run),
                Err(e) => {
                    tracing::warn!(attempt, error = %format!("{e:#}"), "failed to start piped");
                    reason = format!("{e:#}");
                }
            }
            if attempt < START_ATTEMPTS {
                sleep(token, START_BACKOFF).await?;
            }
        }
        Err(LauncherError::Start {
            attempts: START_ATTEMPTS,
            reason,
        }
        .into())
    }
}
