//! CLI argument parsing with clap derive
//!
//! The launcher's argv also carries piped flags. Only launcher flags are
//! parsed here; the full argv is kept so it can be forwarded to piped.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser};

use crate::application::services::LauncherOptions;
use crate::domain::LauncherError;
use crate::domain::args::launcher_args;
use crate::domain::release::{DEFAULT_DOWNLOAD_URL_TEMPLATE, LAUNCHER_VERSION, Platform};
use crate::infra::config_source::{
    AwsSecretSource, FileSource, GcpSecretSource, GitRepoConfig, GitRepoSource, InlineSource,
    PipedConfigSource,
};

/// Keeps a piped running at the version and config requested by the control plane
#[derive(Parser, Debug)]
#[command(name = "launcher", version)]
pub struct Cli {
    /// Path to the piped config file
    #[arg(long, env = "LAUNCHER_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Base64 encoded piped config
    #[arg(long, env = "LAUNCHER_CONFIG_DATA", hide_env_values = true)]
    pub config_data: Option<String>,

    /// Load the piped config from GCP Secret Manager
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub config_from_gcp_secret: bool,

    /// Secret version to load, e.g. projects/p/secrets/s/versions/latest
    #[arg(long)]
    pub gcp_secret_id: Option<String>,

    /// Load the piped config from AWS Secrets Manager
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub config_from_aws_secret: bool,

    /// ARN or name of the secret to load
    #[arg(long)]
    pub aws_secret_id: Option<String>,

    /// Load the piped config from a Git repository
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub config_from_git_repo: bool,

    /// Repository holding the piped config
    #[arg(long)]
    pub git_repo_url: Option<String>,

    /// Branch holding the piped config
    #[arg(long)]
    pub git_branch: Option<String>,

    /// Path of the piped config relative to the repository root
    #[arg(long)]
    pub git_piped_config_file: Option<String>,

    /// Private key used to access the repository over SSH
    #[arg(long)]
    pub git_ssh_key_file: Option<PathBuf>,

    /// Use plaintext connections to the control plane
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, default_value_t = false, default_missing_value = "true")]
    pub insecure: bool,

    /// CA certificate used to verify the control plane
    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    /// Directory holding piped binaries and configs [default: <cache dir>/piped-launcher]
    #[arg(long, env = "LAUNCHER_HOME_DIR")]
    pub home_dir: Option<PathBuf>,

    /// Piped version used when the control plane does not ask for one
    #[arg(long, default_value = "")]
    pub default_version: String,

    /// Accepted for compatibility; the launcher serves no admin endpoint
    #[arg(long, default_value_t = 0)]
    pub launcher_admin_port: u16,

    /// How often to check the desired version and config
    #[arg(long, default_value = "1m", value_parser = parse_duration)]
    pub check_interval: Duration,

    /// How long piped gets to stop before it is killed
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub grace_period: Duration,

    /// Where piped binaries are fetched from; {version} and {os} are substituted
    #[arg(long, env = "LAUNCHER_DOWNLOAD_URL_TEMPLATE", default_value = DEFAULT_DOWNLOAD_URL_TEMPLATE)]
    pub download_url_template: String,

    /// The whole argv without the program name, piped flags included.
    #[arg(skip)]
    pub raw_args: Vec<String>,
}

impl Cli {
    /// Parse the launcher flags out of `args`, which excludes the program
    /// name. Unknown flags are left for piped.
    ///
    /// # Errors
    ///
    /// Returns the clap error for malformed launcher flags.
    pub fn parse_launcher(args: &[String]) -> Result<Self, clap::Error> {
        let own = launcher_args(args).into_iter().map(long_flag);
        // help and version are clap's, not launcher flags
        let meta = args
            .iter()
            .cloned()
            .map(long_flag)
            .filter(|arg| CLAP_FLAGS.contains(&arg.as_str()));
        let mut cli =
            Self::try_parse_from(std::iter::once("launcher".to_string()).chain(own).chain(meta))?;
        cli.raw_args = args.to_vec();
        Ok(cli)
    }

    /// Check the flags each config source needs.
    ///
    /// # Errors
    ///
    /// Returns [`LauncherError::MissingFlag`] for the first missing flag.
    pub fn validate(&self) -> Result<(), LauncherError> {
        fn require(
            value: Option<&str>,
            flag: &'static str,
            source_name: &'static str,
        ) -> Result<(), LauncherError> {
            if value.is_some_and(|v| !v.is_empty()) {
                Ok(())
            } else {
                Err(LauncherError::MissingFlag { flag, source_name })
            }
        }

        if self.config_from_gcp_secret {
            require(self.gcp_secret_id.as_deref(), "gcp-secret-id", "GCP SecretManager service")?;
        }
        if self.config_from_aws_secret {
            require(self.aws_secret_id.as_deref(), "aws-secret-id", "AWS Secrets Manager service")?;
        }
        if self.config_from_git_repo {
            require(self.git_repo_url.as_deref(), "git-repo-url", "Git")?;
            require(self.git_branch.as_deref(), "git-branch", "Git")?;
            require(self.git_piped_config_file.as_deref(), "git-piped-config-file", "Git")?;
        }
        Ok(())
    }

    /// The config source selected by the flags, checked in this order:
    /// file, inline data, GCP, AWS, Git.
    ///
    /// # Errors
    ///
    /// Returns [`LauncherError::MissingConfigSource`] when none is set.
    pub fn config_source<R>(
        &self,
        runner: R,
        http: reqwest::Client,
    ) -> Result<PipedConfigSource<R>, LauncherError> {
        self.validate()?;
        if let Some(path) = &self.config_file {
            return Ok(PipedConfigSource::File(FileSource { path: path.clone() }));
        }
        if let Some(data) = self.config_data.as_ref().filter(|d| !d.is_empty()) {
            return Ok(PipedConfigSource::Inline(InlineSource { data: data.clone() }));
        }
        if self.config_from_gcp_secret {
            return Ok(PipedConfigSource::Gcp(GcpSecretSource {
                client: http,
                secret_id: self.gcp_secret_id.clone().unwrap_or_default(),
            }));
        }
        if self.config_from_aws_secret {
            return Ok(PipedConfigSource::Aws(AwsSecretSource {
                secret_id: self.aws_secret_id.clone().unwrap_or_default(),
            }));
        }
        if self.config_from_git_repo {
            return Ok(PipedConfigSource::Git(GitRepoSource::new(
                runner,
                GitRepoConfig {
                    url: self.git_repo_url.clone().unwrap_or_default(),
                    branch: self.git_branch.clone().unwrap_or_default(),
                    config_file: self.git_piped_config_file.clone().unwrap_or_default(),
                    ssh_key_file: self.git_ssh_key_file.clone(),
                },
            )));
        }
        Err(LauncherError::MissingConfigSource)
    }

    /// Loop options for the current platform.
    ///
    /// # Errors
    ///
    /// Returns an error when no home directory is given and the user cache
    /// directory cannot be determined.
    pub fn options(&self) -> Result<LauncherOptions> {
        let home_dir = match &self.home_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .ok_or_else(|| {
                    LauncherError::InvalidConfig(
                        "could not determine the user cache directory, set --home-dir".into(),
                    )
                })?
                .join("piped-launcher"),
        };
        Ok(LauncherOptions {
            home_dir,
            default_version: self.default_version.clone(),
            download_url_template: self.download_url_template.clone(),
            check_interval: self.check_interval,
            grace_period: self.grace_period,
            args: self.raw_args.clone(),
            launcher_version: LAUNCHER_VERSION.to_string(),
            platform: Platform::current(),
        })
    }
}

const CLAP_FLAGS: &[&str] = &["-h", "--help", "-V", "--version"];

/// piped style `-flag` becomes `--flag`; single-letter short flags stay.
fn long_flag(arg: String) -> String {
    if arg.len() > 2 && arg.starts_with('-') && !arg.starts_with("--") {
        format!("-{arg}")
    } else {
        arg
    }
}

/// Parse durations such as `30s`, `1m`, `1h30m` or `500ms`.
///
/// # Errors
///
/// Returns [`LauncherError::InvalidDuration`] for anything else.
pub fn parse_duration(raw: &str) -> Result<Duration, LauncherError> {
    let invalid = || LauncherError::InvalidDuration(raw.to_string());
    let mut rest = raw.trim();
    if rest.is_empty() {
        return Err(invalid());
    }
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}
