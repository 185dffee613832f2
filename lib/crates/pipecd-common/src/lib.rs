//! Primitives shared by the piped launcher and the piped plugins.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cancel;
pub mod command_runner;
pub mod logging;

pub use cancel::Cancelled;
pub use command_runner::{CommandRunner, TokioCommandRunner};
