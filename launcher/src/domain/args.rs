//! Command-line arguments shared between the launcher and the piped it runs.
//!
//! The launcher accepts its own flags plus any piped flag. Its own flags are
//! parsed here; everything else is forwarded verbatim to the child.

/// Flags that configure the launcher and are never forwarded to piped.
pub const IGNORED_FLAGS: &[&str] = &[
    "config-file",
    "config-data",
    "config-from-gcp-secret",
    "gcp-secret-id",
    "config-from-git-repo",
    "config-from-aws-secret",
    "aws-secret-id",
    "git-repo-url",
    "git-branch",
    "git-piped-config-file",
    "git-ssh-key-file",
    "home-dir",
    "default-version",
    "launcher-admin-port",
    "check-interval",
    "download-url-template",
];

/// Launcher flags that piped also understands, so they are parsed and
/// forwarded.
pub const SHARED_FLAGS: &[&str] = &["insecure", "cert-file", "grace-period"];

/// Launcher flags that take no value.
const BOOL_FLAGS: &[&str] = &[
    "config-from-gcp-secret",
    "config-from-aws-secret",
    "config-from-git-repo",
    "insecure",
];

/// Split a raw argument into its flag name and inline value.
///
/// `--name=value` gives `("name", Some("value"))`, `-name` gives
/// `("name", None)`. Positional arguments give `None`.
#[must_use]
pub fn flag_name(arg: &str) -> Option<(&str, Option<&str>)> {
    if !arg.starts_with('-') || arg == "-" || arg == "--" {
        return None;
    }
    let normalized = arg.trim_start_matches('-');
    Some(match normalized.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (normalized, None),
    })
}

fn is_launcher_flag(name: &str) -> bool {
    IGNORED_FLAGS.contains(&name) || SHARED_FLAGS.contains(&name)
}

/// Whether the token after `--name` is the flag's value.
fn takes_separate_value(name: &str, inline: Option<&str>, next: Option<&String>) -> bool {
    inline.is_none()
        && !BOOL_FLAGS.contains(&name)
        && next.is_some_and(|n| flag_name(n).is_none())
}

/// The subset of `args` that belongs to the launcher, with separate values
/// kept next to their flags.
#[must_use]
pub fn launcher_args(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if let Some((name, inline)) = flag_name(&args[i])
            && is_launcher_flag(name)
        {
            out.push(args[i].clone());
            if takes_separate_value(name, inline, args.get(i + 1)) {
                out.push(args[i + 1].clone());
                i += 1;
            }
        }
        i += 1;
    }
    out
}

/// Arguments for piped: `piped --config-file=<path> --launcher-version=<v>`
/// followed by every launcher argument whose flag is not in
/// [`IGNORED_FLAGS`].
#[must_use]
pub fn make_piped_args(args: &[String], config_file: &str, launcher_version: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len() + 3);
    out.push("piped".to_string());
    out.push(format!("--config-file={config_file}"));
    out.push(format!("--launcher-version={launcher_version}"));

    let mut i = 0;
    while i < args.len() {
        match flag_name(&args[i]) {
            Some((name, inline)) if IGNORED_FLAGS.contains(&name) => {
                if takes_separate_value(name, inline, args.get(i + 1)) {
                    i += 1;
                }
            }
            _ => out.push(args[i].clone()),
        }
        i += 1;
    }
    out
}
