//! # Worker handle
//!
//! [`Worker`] is the supervisor's exclusive handle to the one running module.
//! Stopping is split in three so the caller can bound the wait uniformly:
//!
//! ```text
//! request_stop()         SIGTERM / token.cancel()          (non-blocking)
//!      │
//! await_stop(grace) ───► true  : exit observed within grace
//!      │
//!      └──────────────► false : force_kill()  SIGKILL / task abort
//! ```
//!
//! Every backend reports its death through a `watch` channel, which is how the
//! supervisor notices crashes (see [`Worker::exited`]).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use super::process;
use crate::error::WorkerError;

/// How a worker ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// Clean exit (status 0, or the module returned after cancellation).
    Success,
    /// Non-zero status, signal, module error or panic.
    Failure(String),
    /// Terminated by [`Worker::force_kill`].
    Killed,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Success => f.write_str("success"),
            WorkerExit::Failure(reason) => f.write_str(reason),
            WorkerExit::Killed => f.write_str("killed"),
        }
    }
}

pub(crate) type ExitSender = watch::Sender<Option<WorkerExit>>;
pub(crate) type ExitReceiver = watch::Receiver<Option<WorkerExit>>;

enum Backend {
    Process {
        pid: Option<u32>,
        kill_tx: Option<oneshot::Sender<()>>,
    },
    Task {
        token: CancellationToken,
        abort: AbortHandle,
    },
}

/// Handle to a running worker.
pub struct Worker {
    name: Arc<str>,
    generation: u64,
    subtree: Value,
    exit_rx: ExitReceiver,
    backend: Backend,
}

impl Worker {
    pub(crate) fn process(
        name: Arc<str>,
        generation: u64,
        subtree: Value,
        pid: Option<u32>,
        kill_tx: oneshot::Sender<()>,
        exit_rx: ExitReceiver,
    ) -> Self {
        Self {
            name,
            generation,
            subtree,
            exit_rx,
            backend: Backend::Process {
                pid,
                kill_tx: Some(kill_tx),
            },
        }
    }

    pub(crate) fn task(
        name: Arc<str>,
        generation: u64,
        subtree: Value,
        token: CancellationToken,
        abort: AbortHandle,
        exit_rx: ExitReceiver,
    ) -> Self {
        Self {
            name,
            generation,
            subtree,
            exit_rx,
            backend: Backend::Task { token, abort },
        }
    }

    /// `module/submodule` of this worker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared name, for events.
    pub fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Launch counter value assigned by the supervisor.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Settings subtree the worker was built from.
    pub fn subtree(&self) -> &Value {
        &self.subtree
    }

    /// True until a death notification has been observed.
    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// Exit outcome, once the worker is dead.
    pub fn exit_status(&self) -> Option<WorkerExit> {
        self.exit_rx.borrow().clone()
    }

    /// Asks the worker to terminate cooperatively. Returns immediately.
    pub fn request_stop(&self) -> Result<(), WorkerError> {
        if !self.is_alive() {
            return Ok(());
        }
        match &self.backend {
            Backend::Process { pid: Some(pid), .. } => process::send_terminate(*pid, &self.name),
            Backend::Process { pid: None, .. } => Ok(()),
            Backend::Task { token, .. } => {
                token.cancel();
                Ok(())
            }
        }
    }

    /// Waits up to `timeout` for the worker to die. Returns whether it did.
    pub async fn await_stop(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.exit_rx.wait_for(Option::is_some)).await {
            Ok(_) => true,
            Err(_elapsed) => false,
        }
    }

    /// Terminates the worker unconditionally.
    pub fn force_kill(&mut self) {
        match &mut self.backend {
            Backend::Process { kill_tx, .. } => {
                if let Some(tx) = kill_tx.take() {
                    let _ = tx.send(());
                }
            }
            Backend::Task { abort, .. } => abort.abort(),
        }
    }

    /// Completes when the worker dies, with its outcome.
    ///
    /// Cancel-safe: used inside the supervisor's `select!` loop.
    pub async fn exited(&mut self) -> WorkerExit {
        match self.exit_rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.clone().unwrap_or(WorkerExit::Killed),
            Err(_closed) => WorkerExit::Failure("death notification lost".to_string()),
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("alive", &self.is_alive())
            .finish()
    }
}
