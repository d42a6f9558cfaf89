//! # edgevisor
//!
//! **Edgevisor** is the supervisor of an edge detection agent.
//!
//! A device runs exactly one detection module at a time (camera object
//! detection or Wi-Fi probe sniffing). The agent starts the module named by
//! its persisted configuration document, swaps it when a new document arrives
//! over MQTT, and shuts it down cleanly on SIGINT/SIGTERM.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   MQTT broker ──► ControlLoop ──► MessageHandler (SupervisorHandle)
//!                       │                 │ try_submit(ControlMessage)
//!                       │                 ▼
//!                       │     ┌─────────────────────────────────────────┐
//!   OS signals ─────────┼────►│  Supervisor (single-owner actor)        │
//!                       │     │  - FIFO inbox of control messages       │
//!                       │     │  - ConfigStore (env.json, atomic save)  │
//!                       │     │  - WorkerRegistry (module/submodule)    │
//!                       │     │  - Option<Worker> (at most one)         │
//!                       │     └──────────────┬──────────────────────────┘
//!                       │                    │ launch / request_stop / force_kill
//!                       │                    ▼
//!                       │          ┌───────────────────┐
//!                       │          │ Worker (process)  │  stdout/stderr lines
//!                       │          │ `edgevisor worker`│───────────┐
//!                       │          └───────────────────┘           │
//!                       ▼                                          ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │              (capacity: SupervisorConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                            SubscriberSet
//!                   ┌───────────────┼────────────────┐
//!                   ▼               ▼                ▼
//!               LogWriter       Reporter     DetectionForwarder
//! ```
//!
//! ### Reconfiguration
//! ```text
//! payload ─► parse ─► save ─► stop old (grace, then kill) ─► load ─► start new
//!              ✗        ✗
//!              └────────┴──► rejected, old worker keeps running
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Single worker, FIFO reconfiguration, graceful shutdown.  | [`Supervisor`], [`SupervisorHandle`]        |
//! | **Configuration** | Persisted document with atomic replace.                  | [`ConfigDocument`], [`ConfigStore`]         |
//! | **Workers**       | Variant registry, process and in-process backends.       | [`WorkerRegistry`], [`Launch`], [`Worker`]  |
//! | **Control**       | MQTT subscription, detection and report publishing.      | [`ControlLoop`], [`Publish`]                |
//! | **Subscriber API**| Hook into runtime events.                                | [`Subscribe`]                               |
//! | **Errors**        | Typed errors with stable labels.                         | [`RuntimeError`], [`ConfigError`]           |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use edgevisor::{FileStore, LogWriter, Supervisor, SupervisorConfig, WorkerRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = SupervisorConfig::default();
//!     cfg.grace = Duration::from_secs(5);
//!
//!     let sup = Supervisor::builder(cfg)
//!         .with_store(Arc::new(FileStore::new("/etc/edgevisor/env.json")))
//!         .with_registry(WorkerRegistry::with_defaults()?)
//!         .with_subscribers(vec![Arc::new(LogWriter::new())])
//!         .build();
//!
//!     let handle = sup.handle();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_secs(60)).await;
//!         handle.shutdown();
//!     });
//!
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod control;
mod core;
mod error;
pub mod events;
pub mod modules;
pub mod policies;
pub mod subscribers;
pub mod worker;

// ---- Public re-exports ----

pub use self::core::{
    ControlMessage, CrashPolicy, Supervisor, SupervisorBuilder, SupervisorConfig,
    SupervisorHandle, wait_for_shutdown_signal,
};
pub use config::{ConfigDocument, ConfigStore, DEFAULT_CONFIG_PATH, FileStore};
pub use control::{
    ControlLoop, ControlPublisher, ControlSettings, MessageHandler, Publish, TopicSink, connect,
};
pub use error::{ConfigError, ControlError, RuntimeError, SubmitError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subscribers::{
    DetectionForwarder, LogSink, LogWriter, Report, ReportSink, Reporter, Subscribe, SubscriberSet,
};
pub use worker::{
    CommandSpec, Emit, Launch, LaunchSpec, Module, ProcessLauncher, TaskLauncher, Variant,
    VariantKey, Worker, WorkerExit, WorkerRegistry,
};
