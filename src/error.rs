//! Error types used by the edgevisor runtime, the configuration layer and workers.
//!
//! - [`ConfigError`]: loading, parsing and persisting the configuration document.
//! - [`WorkerError`]: resolving, launching and running detection workers.
//! - [`ControlError`]: the MQTT control channel.
//! - [`RuntimeError`]: fatal outcomes of [`Supervisor::run`](crate::Supervisor::run).
//! - [`SubmitError`]: handing a control message to the supervisor queue.
//!
//! Every enum exposes `as_label()`, a short stable snake_case label for logs and reports.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the configuration layer.
///
/// `NotFound` and `Parse` are fatal at startup. `Malformed` and `Persist` only
/// abort a single reconfiguration; the running worker is left untouched.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No configuration document on stable storage.
    #[error("configuration document not found at {path:?}")]
    NotFound {
        /// Location that was probed.
        path: PathBuf,
    },

    /// The stored bytes are not a well-formed document.
    #[error("configuration document at {path:?} is invalid: {error}")]
    Parse {
        /// Location of the offending document.
        path: PathBuf,
        /// Parser message.
        error: String,
    },

    /// A control payload could not be read as a configuration document.
    #[error("control payload is not a configuration document: {error}")]
    Malformed {
        /// Parser message.
        error: String,
    },

    /// The document could not be written to stable storage.
    #[error("failed to persist configuration to {path:?}: {source}")]
    Persist {
        /// Target location.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A required key is absent from the document.
    #[error("configuration key '{key}' is missing")]
    MissingKey {
        /// Name of the missing key.
        key: String,
    },

    /// A subtree exists but does not match the expected settings shape.
    #[error("invalid settings in '{section}': {error}")]
    InvalidSettings {
        /// Subtree name (`main`, `camera`, `wifi`, ...).
        section: String,
        /// Deserializer message.
        error: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/reports.
    ///
    /// # Example
    /// ```
    /// use edgevisor::ConfigError;
    ///
    /// let err = ConfigError::Malformed { error: "eof".into() };
    /// assert_eq!(err.as_label(), "config_malformed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } => "config_not_found",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::Malformed { .. } => "config_malformed",
            ConfigError::Persist { .. } => "config_persist",
            ConfigError::MissingKey { .. } => "config_missing_key",
            ConfigError::InvalidSettings { .. } => "config_invalid_settings",
        }
    }

    /// True for errors that must terminate the process when met at startup.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            ConfigError::NotFound { .. } | ConfigError::Parse { .. }
        )
    }
}

/// # Errors produced while resolving, launching or running a worker.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// No launcher is registered for the `(module, submodule)` pair.
    #[error("no implementation registered for module '{module}' submodule '{submodule}'")]
    UnknownVariant {
        /// Requested module tag.
        module: String,
        /// Requested submodule tag.
        submodule: String,
    },

    /// The worker's configuration subtree was rejected before launch.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The OS refused to create the worker process.
    #[error("failed to spawn worker '{worker}': {source}")]
    Spawn {
        /// Worker name (`module/submodule`).
        worker: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A signal could not be delivered to the worker process.
    #[error("failed to signal worker '{worker}': {error}")]
    Signal {
        /// Worker name (`module/submodule`).
        worker: String,
        /// OS message.
        error: String,
    },

    /// The module body failed.
    #[error("worker failed: {error}")]
    Failed {
        /// Failure message.
        error: String,
    },

    /// The module observed cancellation and exited.
    #[error("worker cancelled")]
    Canceled,
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs/reports.
    ///
    /// # Example
    /// ```
    /// use edgevisor::WorkerError;
    ///
    /// let err = WorkerError::UnknownVariant { module: "camera".into(), submodule: "x".into() };
    /// assert_eq!(err.as_label(), "worker_unknown_variant");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::UnknownVariant { .. } => "worker_unknown_variant",
            WorkerError::Config(_) => "worker_config",
            WorkerError::Spawn { .. } => "worker_spawn",
            WorkerError::Signal { .. } => "worker_signal",
            WorkerError::Failed { .. } => "worker_failed",
            WorkerError::Canceled => "worker_canceled",
        }
    }

    /// Shorthand for [`WorkerError::Failed`].
    pub fn failed(error: impl std::fmt::Display) -> Self {
        WorkerError::Failed {
            error: error.to_string(),
        }
    }
}

/// # Errors produced by the control channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControlError {
    /// The MQTT client rejected a request (request queue closed or full).
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// A topic was configured with a delivery level outside 0..=2.
    #[error("invalid qos {qos} for topic '{topic}'")]
    InvalidQos {
        /// Topic filter.
        topic: String,
        /// Offending level.
        qos: u8,
    },
}

impl ControlError {
    /// Returns a short stable label (snake_case) for use in logs/reports.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::Client(_) => "control_client",
            ControlError::InvalidQos { .. } => "control_invalid_qos",
        }
    }
}

/// # Fatal outcomes of the supervisor runtime.
///
/// Returned by [`Supervisor::run`](crate::Supervisor::run); the binary maps any
/// of them to a non-zero exit status.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The initial document could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No worker could be started; there is no valid running module.
    #[error("cannot start worker '{variant}': {source}")]
    WorkerStart {
        /// Requested variant (`module/submodule`).
        variant: String,
        /// Launch failure.
        #[source]
        source: WorkerError,
    },

    /// The worker died on its own and the crash policy is `exit`.
    #[error("worker '{worker}' exited unexpectedly: {reason}")]
    Crashed {
        /// Worker name.
        worker: String,
        /// Exit description.
        reason: String,
    },

    /// `run` was called twice on the same supervisor.
    #[error("supervisor is already running")]
    AlreadyRunning,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/reports.
    ///
    /// # Example
    /// ```
    /// use edgevisor::RuntimeError;
    ///
    /// let err = RuntimeError::AlreadyRunning;
    /// assert_eq!(err.as_label(), "runtime_already_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config(_) => "runtime_config",
            RuntimeError::WorkerStart { .. } => "runtime_worker_start",
            RuntimeError::Crashed { .. } => "runtime_worker_crashed",
            RuntimeError::AlreadyRunning => "runtime_already_running",
        }
    }
}

/// # Errors returned when handing a control message to the supervisor.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The reconfiguration queue is full.
    #[error("reconfiguration queue is full")]
    Full,

    /// The supervisor stopped or is shutting down.
    #[error("supervisor is not accepting messages")]
    Closed,
}

impl SubmitError {
    /// Returns a short stable label (snake_case) for use in logs/reports.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Full => "submit_queue_full",
            SubmitError::Closed => "submit_closed",
        }
    }
}

/// Degraded-stop description used in reports when a worker outlives its grace period.
pub(crate) fn stop_timeout_message(worker: &str, grace: Duration) -> String {
    format!("worker '{worker}' did not stop within {grace:?}; forcing termination")
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
