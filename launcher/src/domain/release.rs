//! Where piped binaries come from and where they land on disk.

/// Release URL of a piped binary. `{version}` and `{os}` are substituted.
pub const DEFAULT_DOWNLOAD_URL_TEMPLATE: &str =
    "https://github.com/pipe-cd/pipecd/releases/download/{version}/piped_{version}_{os}_amd64";

/// Media type of a piped binary stored in an OCI registry.
pub const PIPED_MEDIA_TYPE: &str = "application/vnd.pipecd.piped.plugin";

pub const PIPED_BINARY_NAME: &str = "piped";
pub const PIPED_CONFIG_FILE_NAME: &str = "piped-config.yaml";

/// Version reported to piped through `--launcher-version`.
pub const LAUNCHER_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// An operating system and CPU architecture in Go/OCI naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this binary runs on.
    #[must_use]
    pub fn current() -> Self {
        Self::from_rust(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map Rust target names (`macos`, `x86_64`) to OCI names (`darwin`, `amd64`).
    #[must_use]
    pub fn from_rust(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            other => other,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Self::new(os, arch)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Expand a download URL template for `version` on `os`.
#[must_use]
pub fn make_download_url(template: &str, version: &str, os: &str) -> String {
    template.replace("{version}", version).replace("{os}", os)
}
