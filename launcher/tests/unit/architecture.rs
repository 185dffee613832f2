//! Structural tests for architectural boundary enforcement.
//!
//! These tests scan source files to verify that the layer boundaries
//! (domain, application, infra, cli) are maintained.

use std::path::{Path, PathBuf};

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Track brace depth and return whether a line is inside a `#[cfg(test)]` block.
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn new() -> Self {
        Self {
            in_test_block: false,
            brace_depth: 0,
            test_block_start_depth: 0,
        }
    }

    /// Process a line and return `true` if it's inside a `#[cfg(test)]` block.
    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Non-comment lines outside `#[cfg(test)]` blocks, with their line numbers.
fn production_lines(path: &Path) -> Vec<(usize, String)> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut tracker = CfgTestTracker::new();
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            let comment = trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*');
            (!in_test && !comment).then(|| (i + 1, line.to_string()))
        })
        .collect()
}

fn src_dir(parts: &[&str]) -> PathBuf {
    parts
        .iter()
        .fold(Path::new(env!("CARGO_MANIFEST_DIR")).join("src"), |p, part| p.join(part))
}

fn scan(dir: &Path, forbidden: &[&str]) -> Vec<String> {
    let mut violations = Vec::new();
    for file in collect_rs_files(dir) {
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string();
        for (lineno, line) in production_lines(&file) {
            for needle in forbidden {
                if line.contains(needle) {
                    violations.push(format!("{rel}:{lineno}: `{needle}`: {}", line.trim()));
                }
            }
        }
    }
    violations
}

// ── Layer boundaries ──────────────────────────────────────────────────────────

#[test]
fn domain_has_no_io_or_outer_layer_imports() {
    let violations = scan(
        &src_dir(&["domain"]),
        &[
            "crate::application",
            "crate::infra",
            "crate::cli",
            "tokio::",
            "std::fs",
            "reqwest",
            "tonic",
        ],
    );
    assert!(
        violations.is_empty(),
        "domain/ must stay pure:\n{}",
        violations.join("\n")
    );
}

#[test]
fn application_has_no_infra_imports() {
    let violations = scan(
        &src_dir(&["application"]),
        &["crate::infra", "crate::cli", "reqwest", "tonic", "std::process", "tokio::fs"],
    );
    assert!(
        violations.is_empty(),
        "application/ must depend on ports only:\n{}",
        violations.join("\n")
    );
}

#[test]
fn infra_has_no_cli_imports() {
    let violations = scan(&src_dir(&["infra"]), &["crate::cli"]);
    assert!(
        violations.is_empty(),
        "infra/ must not import from cli:\n{}",
        violations.join("\n")
    );
}

// ── Concrete types stay at the edge ───────────────────────────────────────────

#[test]
fn no_tokio_command_runner_new_outside_main() {
    let violations = scan(&src_dir(&[]), &["TokioCommandRunner::new"])
        .into_iter()
        .filter(|v| !v.starts_with("src/main.rs"))
        .collect::<Vec<_>>();
    assert!(
        violations.is_empty(),
        "TokioCommandRunner is only wired in main.rs:\n{}",
        violations.join("\n")
    );
}

#[test]
fn services_take_ports_not_adapters() {
    let adapters = [
        "TokioFs",
        "ProcessSupervisor",
        "ReleaseDownloader",
        "GrpcControlPlane",
        "HttpRegistry",
        "PipedConfigSource",
    ];
    let violations = scan(&src_dir(&["application", "services"]), &adapters);
    assert!(
        violations.is_empty(),
        "application services must use port traits:\n{}",
        violations.join("\n")
    );
}

#[test]
fn library_has_no_print_macros_outside_tests() {
    let violations = scan(&src_dir(&[]), &["println!", "eprintln!"])
        .into_iter()
        .filter(|v| !v.starts_with("src/main.rs"))
        .collect::<Vec<_>>();
    assert!(
        violations.is_empty(),
        "log through tracing instead of printing:\n{}",
        violations.join("\n")
    );
}
