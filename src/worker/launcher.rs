//! # Launch capability
//!
//! [`Launch`] turns a [`LaunchSpec`] into a running [`Worker`]. The registry
//! maps each `(module, submodule)` pair to one launcher.
//!
//! - [`ProcessLauncher`](super::ProcessLauncher): separate OS process (production).
//! - [`TaskLauncher`]: in-process tokio task driving a [`Module`] (tests, embedders).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::handle::{ExitSender, Worker, WorkerExit};
use super::module::{Emit, Module};
use super::variant::VariantKey;
use crate::config::ConfigDocument;
use crate::error::{ConfigError, WorkerError, panic_message};
use crate::events::{Bus, Event, EventKind};

/// Everything a launcher needs to start one worker.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    /// Variant to start.
    pub key: VariantKey,
    /// Settings subtree (the document entry named after the module).
    pub subtree: Value,
    /// Launch counter assigned by the supervisor.
    pub generation: u64,
}

impl LaunchSpec {
    /// Reads the tags and the module subtree from a document.
    pub fn from_document(doc: &ConfigDocument, generation: u64) -> Result<Self, ConfigError> {
        let key = VariantKey::from_document(doc)?;
        let subtree = doc
            .subtree(&key.module)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(Self {
            key,
            subtree,
            generation,
        })
    }
}

/// Starts workers of one variant.
pub trait Launch: Send + Sync + 'static {
    /// Begins execution and returns the handle. Must not block beyond handle creation.
    fn launch(&self, spec: &LaunchSpec, bus: &Bus) -> Result<Worker, WorkerError>;
}

type Factory = Arc<dyn Fn(&Value) -> Result<Arc<dyn Module>, WorkerError> + Send + Sync>;

/// Runs a [`Module`] as a tokio task.
#[derive(Clone)]
pub struct TaskLauncher {
    factory: Factory,
}

impl TaskLauncher {
    /// Creates a launcher building a fresh module from each settings subtree.
    pub fn new(
        factory: impl Fn(&Value) -> Result<Arc<dyn Module>, WorkerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl Launch for TaskLauncher {
    fn launch(&self, spec: &LaunchSpec, bus: &Bus) -> Result<Worker, WorkerError> {
        let module = (self.factory)(&spec.subtree)?;
        let name: Arc<str> = Arc::from(spec.key.to_string());
        let token = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(None);

        let emitter = BusEmitter::new(bus.clone(), name.clone(), spec.generation);
        let guard = ExitGuard {
            tx: exit_tx,
            outcome: WorkerExit::Killed,
        };
        let ctx = token.clone();
        let handle = tokio::spawn(async move {
            let mut guard = guard;
            let res = AssertUnwindSafe(module.run(ctx, &emitter))
                .catch_unwind()
                .await;
            guard.outcome = match res {
                Ok(Ok(())) | Ok(Err(WorkerError::Canceled)) => WorkerExit::Success,
                Ok(Err(e)) => WorkerExit::Failure(e.to_string()),
                Err(panic) => {
                    WorkerExit::Failure(format!("panicked: {}", panic_message(panic.as_ref())))
                }
            };
        });

        Ok(Worker::task(
            name,
            spec.generation,
            spec.subtree.clone(),
            token,
            handle.abort_handle(),
            exit_rx,
        ))
    }
}

/// Publishes the outcome when the task body finishes or is dropped by an abort.
struct ExitGuard {
    tx: ExitSender,
    outcome: WorkerExit,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.tx.send_replace(Some(self.outcome.clone()));
    }
}

/// [`Emit`] that turns lines into `WorkerOutput` events on the bus.
pub struct BusEmitter {
    bus: Bus,
    worker: Arc<str>,
    generation: u64,
}

impl BusEmitter {
    /// Creates an emitter tagged with the worker's name and generation.
    pub fn new(bus: Bus, worker: Arc<str>, generation: u64) -> Self {
        Self {
            bus,
            worker,
            generation,
        }
    }
}

impl Emit for BusEmitter {
    fn emit(&self, line: &str) {
        self.bus.publish(
            Event::new(EventKind::WorkerOutput)
                .with_worker(Arc::clone(&self.worker))
                .with_generation(self.generation)
                .with_topic("stdout")
                .with_reason(line),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Ticker;

    #[async_trait]
    impl Module for Ticker {
        fn name(&self) -> &str {
            "ticker"
        }
        async fn run(&self, ctx: CancellationToken, out: &dyn Emit) -> Result<(), WorkerError> {
            out.emit("tick");
            ctx.cancelled().await;
            Err(WorkerError::Canceled)
        }
    }

    struct Deaf;

    #[async_trait]
    impl Module for Deaf {
        fn name(&self) -> &str {
            "deaf"
        }
        async fn run(&self, _ctx: CancellationToken, _out: &dyn Emit) -> Result<(), WorkerError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct Boom;

    #[async_trait]
    impl Module for Boom {
        fn name(&self) -> &str {
            "boom"
        }
        async fn run(&self, _ctx: CancellationToken, _out: &dyn Emit) -> Result<(), WorkerError> {
            panic!("sensor unplugged");
        }
    }

    fn spec() -> LaunchSpec {
        LaunchSpec {
            key: VariantKey::new("test", "task"),
            subtree: Value::Null,
            generation: 1,
        }
    }

    #[test]
    fn spec_takes_module_subtree() {
        let doc = ConfigDocument::parse(
            br#"{"module":"wifi","submodule":"native","wifi":{"interface":"wlan1"},"camera":{}}"#,
        )
        .unwrap();
        let spec = LaunchSpec::from_document(&doc, 4).unwrap();
        assert_eq!(spec.key.to_string(), "wifi/native");
        assert_eq!(spec.subtree, serde_json::json!({"interface": "wlan1"}));
        assert_eq!(spec.generation, 4);
    }

    #[tokio::test]
    async fn cooperative_stop_is_success() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let launcher = TaskLauncher::new(|_| Ok(Arc::new(Ticker) as Arc<dyn Module>));

        let mut worker = launcher.launch(&spec(), &bus).unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.reason.as_deref(), Some("tick"));
        assert!(worker.is_alive());

        worker.request_stop().unwrap();
        assert!(worker.await_stop(Duration::from_secs(1)).await);
        assert_eq!(worker.exit_status(), Some(WorkerExit::Success));
    }

    #[tokio::test]
    async fn abort_reports_killed() {
        let bus = Bus::new(16);
        let launcher = TaskLauncher::new(|_| Ok(Arc::new(Deaf) as Arc<dyn Module>));

        let mut worker = launcher.launch(&spec(), &bus).unwrap();
        worker.request_stop().unwrap();
        assert!(!worker.await_stop(Duration::from_millis(50)).await);

        worker.force_kill();
        assert!(worker.await_stop(Duration::from_secs(1)).await);
        assert_eq!(worker.exit_status(), Some(WorkerExit::Killed));
    }

    #[tokio::test]
    async fn panic_is_a_failure_exit() {
        let bus = Bus::new(16);
        let launcher = TaskLauncher::new(|_| Ok(Arc::new(Boom) as Arc<dyn Module>));

        let mut worker = launcher.launch(&spec(), &bus).unwrap();
        match worker.exited().await {
            WorkerExit::Failure(reason) => assert!(reason.contains("sensor unplugged")),
            other => panic!("unexpected exit: {other:?}"),
        }
    }

    #[test]
    fn factory_errors_surface_from_launch() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let _guard = rt.enter();
        let launcher = TaskLauncher::new(|_| Err(WorkerError::failed("no camera")));
        let err = launcher.launch(&spec(), &Bus::new(1)).unwrap_err();
        assert_eq!(err.to_string(), "worker failed: no camera");
    }
}
