//! Integration tests for the piped launcher
//!
//! These tests spawn real processes, serve a local OCI registry and run the
//! launcher binary. They are slower and should be run separately from unit
//! tests.

mod cli_tests;
mod launcher_loop;
