//! Piped launcher - keeps a piped running at the version and config requested
//! by the control plane

use anyhow::{Context, Result};
use pipecd_common::TokioCommandRunner;
use piped_launcher::application::services::{Launcher, LauncherPorts};
use piped_launcher::cli::Cli;
use piped_launcher::domain::release::Platform;
use piped_launcher::infra::{
    GrpcControlPlane, HttpRegistry, ProcessSupervisor, ReleaseDownloader, TokioFs,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match Cli::parse_launcher(&args) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    if let Err(e) = pipecd_common::logging::init("info") {
        eprintln!("Error: {e}");
    }
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let runner = TokioCommandRunner::new();
    let config = cli.config_source(runner.clone(), http.clone())?;
    let options = cli.options()?;
    if cli.launcher_admin_port != 0 {
        tracing::info!(port = cli.launcher_admin_port, "admin endpoint is not served by this launcher");
    }

    let ports = LauncherPorts {
        config,
        control_plane: GrpcControlPlane::new(cli.insecure, cli.cert_file.clone()),
        downloader: ReleaseDownloader::new(
            http.clone(),
            HttpRegistry::new(http, cli.insecure),
            Platform::current(),
        ),
        supervisor: ProcessSupervisor::new(runner),
        fs: TokioFs,
    };

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    tracing::info!(
        home = %options.home_dir.display(),
        interval = ?options.check_interval,
        "launcher started"
    );
    Launcher::new(ports, options).run(&token).await
}

async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, stopping piped"),
        () = terminate => tracing::info!("received terminate signal, stopping piped"),
    }
    token.cancel();
}
