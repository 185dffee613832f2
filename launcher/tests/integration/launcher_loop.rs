//! The launcher loop with real processes, downloads and files.
//!
//! Piped "releases" are shell scripts served through a `file://` download
//! template. Each script records its arguments and waits for SIGTERM.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pipecd_common::TokioCommandRunner;
use piped_launcher::application::ports::ControlPlane;
use piped_launcher::application::services::{Launcher, LauncherOptions, LauncherPorts};
use piped_launcher::domain::ControlPlaneEndpoint;
use piped_launcher::domain::release::Platform;
use piped_launcher::infra::config_source::FileSource;
use piped_launcher::infra::{HttpRegistry, ProcessSupervisor, ReleaseDownloader, TokioFs};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct SwitchableControlPlane {
    version: Arc<Mutex<String>>,
}

impl ControlPlane for SwitchableControlPlane {
    async fn desired_version(&self, _: &ControlPlaneEndpoint) -> Result<String> {
        Ok(self.version.lock().unwrap().clone())
    }
}

/// Write a fake piped release for `version` into `releases`. The args
/// marker is written only after the TERM trap is in place.
fn write_release(releases: &Path, markers: &Path, version: &str) {
    let os = Platform::current().os;
    let script = format!(
        "#!/bin/sh\n\
         trap 'echo stopped > {markers}/{version}.stopped; exit 0' TERM\n\
         echo \"$@\" > {markers}/{version}.args\n\
         while true; do sleep 0.1; done\n",
        markers = markers.display(),
    );
    std::fs::write(releases.join(format!("piped_{version}_{os}")), script).unwrap();
}

async fn wait_for(path: &Path) {
    tokio::time::timeout(Duration::from_secs(20), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never appeared", path.display()));
}

struct Setup {
    _root: tempfile::TempDir,
    home: PathBuf,
    releases: PathBuf,
    markers: PathBuf,
    config_file: PathBuf,
}

fn setup() -> Setup {
    let root = tempfile::tempdir().unwrap();
    let home = root.path().join("home");
    let releases = root.path().join("releases");
    let markers = root.path().join("markers");
    std::fs::create_dir_all(&releases).unwrap();
    std::fs::create_dir_all(&markers).unwrap();
    let config_file = root.path().join("piped.yaml");
    let config = format!(
        "kind: Piped\nspec:\n  apiAddress: localhost:9443\n  projectID: quickstart\n  pipedID: piped-1\n  pipedKeyData: {}\n",
        STANDARD.encode("key")
    );
    std::fs::write(&config_file, config).unwrap();
    Setup {
        home,
        releases,
        markers,
        config_file,
        _root: root,
    }
}

#[tokio::test]
async fn test_launcher_relaunches_on_version_change_and_cleans_up() {
    let s = setup();
    write_release(&s.releases, &s.markers, "v1");
    write_release(&s.releases, &s.markers, "v2");

    let control_plane = SwitchableControlPlane {
        version: Arc::new(Mutex::new("v1".into())),
    };
    let http = reqwest::Client::new();
    let ports = LauncherPorts {
        config: FileSource {
            path: s.config_file.clone(),
        },
        control_plane: control_plane.clone(),
        downloader: ReleaseDownloader::new(
            http.clone(),
            HttpRegistry::new(http, true),
            Platform::current(),
        ),
        supervisor: ProcessSupervisor::new(TokioCommandRunner::new()),
        fs: TokioFs,
    };
    let options = LauncherOptions {
        home_dir: s.home.clone(),
        default_version: String::new(),
        download_url_template: format!("file://{}/piped_{{version}}_{{os}}", s.releases.display()),
        check_interval: Duration::from_millis(200),
        grace_period: Duration::from_secs(5),
        args: vec![
            format!("--config-file={}", s.config_file.display()),
            "--tools-dir=/tmp/tools".into(),
        ],
        launcher_version: "v0.1.0".into(),
        platform: Platform::current(),
    };

    let token = CancellationToken::new();
    let driver = async {
        wait_for(&s.markers.join("v1.args")).await;
        *control_plane.version.lock().unwrap() = "v2".into();
        wait_for(&s.markers.join("v2.args")).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(Launcher::new(ports, options).run(&token), driver);
    result.expect("launcher stops cleanly");

    // v1 was asked to stop before v2 started; v2 was stopped on shutdown
    assert!(s.markers.join("v1.stopped").exists());
    assert!(s.markers.join("v2.stopped").exists());
    assert!(!s.home.join("piped").exists(), "working directory left behind");

    let args = std::fs::read_to_string(s.markers.join("v2.args")).unwrap();
    let config_path = s.home.join("piped/config/piped-config.yaml");
    assert_eq!(
        args.trim(),
        format!(
            "piped --config-file={} --launcher-version=v0.1.0 --tools-dir=/tmp/tools",
            config_path.display()
        )
    );
}
