//! Integration tests for the launcher binary
//!
//! These tests spawn the actual binary and only exercise paths that fail
//! before any network access.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn launcher() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("launcher"));
    for var in [
        "LAUNCHER_CONFIG_FILE",
        "LAUNCHER_CONFIG_DATA",
        "LAUNCHER_HOME_DIR",
        "LAUNCHER_DOWNLOAD_URL_TEMPLATE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_cli_help_lists_launcher_flags() {
    launcher()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--config-from-git-repo"))
        .stdout(predicate::str::contains("--grace-period"));
}

#[test]
fn test_cli_version_flag_shows_version() {
    launcher()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("launcher"));
}

#[test]
fn test_cli_without_config_source_fails() {
    launcher()
        .arg("--tools-dir=/tmp/tools")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "either [config-file, config-data, config-from-gcp-secret, config-from-aws-secret, config-from-git-repo] must be set",
        ));
}

#[test]
fn test_cli_gcp_source_requires_secret_id() {
    launcher()
        .arg("--config-from-gcp-secret")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "gcp-secret-id must be set to load Piped config from GCP SecretManager service",
        ));
}

#[test]
fn test_cli_rejects_bad_duration() {
    launcher()
        .args(["--config-file=/tmp/piped.yaml", "--check-interval=soon"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("soon"));
}

#[test]
fn test_cli_single_dash_help_alongside_piped_flags() {
    launcher()
        .args(["-tools-dir=/tmp/tools", "-help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--check-interval"));
}

#[test]
fn test_cli_overflowing_duration_is_a_usage_error() {
    launcher()
        .arg("--check-interval=307445734561825862m")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid duration"));
}
