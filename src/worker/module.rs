//! # Module body contract
//!
//! A [`Module`] is the detection loop that runs inside a worker. It is given a
//! cancellation token and an [`Emit`] sink for output lines, and must return
//! promptly once the token is cancelled, after releasing whatever it claimed
//! (interfaces in monitor mode, child processes, serial ports).
//!
//! The same trait backs both worker backends: the in-process task launcher
//! drives it directly, and the `worker` subcommand drives it inside the child
//! process with SIGTERM mapped to cancellation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;

/// Sink for worker output lines (one detection per line).
pub trait Emit: Send + Sync {
    /// Emits one line. Must not block.
    fn emit(&self, line: &str);
}

/// A detection module body.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Stable name for logs.
    fn name(&self) -> &str;

    /// Runs until `ctx` is cancelled or the module fails.
    ///
    /// Returning `Ok(())` or [`WorkerError::Canceled`] after cancellation is a
    /// clean stop.
    async fn run(&self, ctx: CancellationToken, out: &dyn Emit) -> Result<(), WorkerError>;
}
