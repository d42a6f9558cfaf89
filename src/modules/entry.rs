//! Body of the internal `worker` subcommand: runs one module in this process
//! until SIGTERM (or SIGINT) arrives.

use std::io::Write;

use anyhow::Context;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::build;
use crate::core::wait_for_shutdown_signal;
use crate::error::WorkerError;
use crate::worker::{Emit, Variant, WORKER_CONFIG_ENV};

/// Writes each line to stdout, where the supervisor's relay picks it up.
struct StdoutEmitter;

impl Emit for StdoutEmitter {
    fn emit(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

/// Runs the `(module, submodule)` worker with settings from the environment.
pub async fn run_worker(module: &str, submodule: &str) -> anyhow::Result<()> {
    let variant = Variant::from_tags(module, submodule).ok_or_else(|| WorkerError::UnknownVariant {
        module: module.to_string(),
        submodule: submodule.to_string(),
    })?;

    let subtree = match std::env::var(WORKER_CONFIG_ENV) {
        Ok(raw) => serde_json::from_str::<Value>(&raw)
            .with_context(|| format!("{WORKER_CONFIG_ENV} is not JSON"))?,
        Err(_) => Value::Object(Map::new()),
    };
    let body = build(variant, &subtree)?;

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            log::error!(target: "edgevisor::worker", "signal handler unavailable: {e}");
            return;
        }
        on_signal.cancel();
    });

    log::info!(target: "edgevisor::worker", "{} running (pid {})", body.name(), std::process::id());
    match body.run(token, &StdoutEmitter).await {
        Ok(()) | Err(WorkerError::Canceled) => {
            log::info!(target: "edgevisor::worker", "{} stopped", body.name());
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("{variant} failed")),
    }
}
