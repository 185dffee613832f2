//! Cooperative cancellation helpers.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned by any operation interrupted through its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Sleep for `period` unless `token` fires first.
///
/// # Errors
///
/// Returns [`Cancelled`] when the token fires before the period elapses.
pub async fn sleep(token: &CancellationToken, period: Duration) -> Result<(), Cancelled> {
    tokio::select! {
        () = tokio::time::sleep(period) => Ok(()),
        () = token.cancelled() => Err(Cancelled),
    }
}

/// Drive `fut` to completion unless `token` fires first.
///
/// Dropping `fut` on cancellation releases whatever it holds; child
/// processes spawned through [`crate::TokioCommandRunner`] are killed.
///
/// # Errors
///
/// Returns [`Cancelled`] when the token fires before `fut` completes.
pub async fn run_until_cancelled<F: Future>(
    token: &CancellationToken,
    fut: F,
) -> Result<F::Output, Cancelled> {
    tokio::select! {
        out = fut => Ok(out),
        () = token.cancelled() => Err(Cancelled),
    }
}
