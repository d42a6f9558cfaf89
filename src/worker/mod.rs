//! Worker abstraction: variants, launchers and the running-worker handle.
//!
//! ## Contents
//! - [`Variant`], [`VariantKey`] module/submodule selection
//! - [`WorkerRegistry`] `(module, submodule)` → [`Launch`] table
//! - [`Launch`], [`LaunchSpec`], [`TaskLauncher`], [`ProcessLauncher`] backends
//! - [`Worker`], [`WorkerExit`] the two-phase stop contract
//! - [`Module`], [`Emit`] what runs inside a worker

mod handle;
mod launcher;
mod module;
mod process;
mod registry;
mod variant;

pub use handle::{Worker, WorkerExit};
pub use launcher::{BusEmitter, Launch, LaunchSpec, TaskLauncher};
pub use module::{Emit, Module};
pub use process::{CommandSpec, ProcessLauncher, WORKER_CONFIG_ENV};
pub use registry::WorkerRegistry;
pub use variant::{Variant, VariantKey};

pub(crate) use process::terminate_child;
