//! # Supervisor: owns the single worker, reconfigures it, shuts it down.
//!
//! The [`Supervisor`] is a single-owner actor: one task holds the current
//! [`Worker`] and processes, strictly in order, the control messages queued
//! through its [`SupervisorHandle`]. Termination (OS signal or
//! [`SupervisorHandle::shutdown`]) goes through the same actor, so it
//! serializes against reconfiguration.
//!
//! ## High-level architecture
//! ```text
//! run():
//!   subscriber listener:  receiver taken at build() ─► SubscriberSet::emit(&Event)   (fire-and-forget)
//!   signal listener:      wait_for_shutdown_signal() ─► ShutdownRequested, token.cancel()
//!   actor:
//!     store.load() ─► start(doc) ─► Running
//!     loop select! (biased) {
//!        token.cancelled()     ─► break
//!        worker.exited()       ─► crash policy (report | restart | exit)
//!        restart timer         ─► start(store.load())
//!        inbox.recv()          ─► reconfigure(msg)
//!     }
//!     terminate()
//! ```
//!
//! ## Reconfiguration
//! ```text
//! parse payload ──✗──► ReconfigureRejected (worker untouched)
//!   │
//! store.save ────✗──► ReconfigureRejected (worker untouched)
//!   │
//! Reconfiguring: request_stop ─► await_stop(grace) ──timeout──► force_kill (once)
//!   │
//! shutdown requested? ──yes──► skip start, terminate
//!   │
//! start(store.load()) ──✗──► RuntimeFailed, run() returns Err
//!   │
//! Running, ReconfigureApplied
//! ```
//!
//! ## Termination
//! ```text
//! ShuttingDown ─► drop queued messages (ReconfigureDropped)
//!              ─► request_stop ─► await_stop(grace) ──timeout──► WorkerStopTimeout, force_kill
//!              ─► Stopped, ShutdownCompleted, run() returns Ok
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use edgevisor::{FileStore, LogWriter, Supervisor, SupervisorConfig, WorkerRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_store(Arc::new(FileStore::new("env.json")))
//!         .with_registry(WorkerRegistry::with_defaults()?)
//!         .with_subscribers(vec![Arc::new(LogWriter::new())])
//!         .build();
//!
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::builder::SupervisorBuilder;
use super::config::{CrashPolicy, SupervisorConfig};
use super::handle::{ControlMessage, SupervisorHandle, request_shutdown};
use super::shutdown::wait_for_shutdown_signal;
use super::state::SupervisorState;
use crate::config::{ConfigDocument, ConfigStore};
use crate::error::{ConfigError, RuntimeError, WorkerError, stop_timeout_message};
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::worker::{LaunchSpec, VariantKey, Worker, WorkerExit, WorkerRegistry};

/// How long to wait for the death notification after a force kill.
const KILL_REAP: Duration = Duration::from_secs(1);

/// Coordinates the single worker, reconfiguration, event delivery and shutdown.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    store: Arc<dyn ConfigStore>,
    registry: WorkerRegistry,
    subscribers: Mutex<Vec<Arc<dyn Subscribe>>>,
    events: Mutex<Option<broadcast::Receiver<Event>>>,
    inbox: Mutex<Option<mpsc::Receiver<ControlMessage>>>,
    handle: SupervisorHandle,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: SupervisorConfig,
        store: Arc<dyn ConfigStore>,
        registry: WorkerRegistry,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        // Subscribed now so events published before `run` still reach subscribers.
        let events = bus.subscribe();
        let (tx, rx) = mpsc::channel(cfg.queue_capacity_clamped());
        let shutdown = CancellationToken::new();
        let handle = SupervisorHandle::new(tx, bus.clone(), shutdown.clone());
        Self {
            cfg,
            bus,
            store,
            registry,
            subscribers: Mutex::new(subscribers),
            events: Mutex::new(Some(events)),
            inbox: Mutex::new(Some(rx)),
            handle,
            shutdown,
        }
    }

    /// Handle for queuing control messages and requesting shutdown.
    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    /// Event bus shared with workers and the control loop.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runtime settings.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Runs until termination is requested (`Ok`) or a fatal error occurs (`Err`).
    ///
    /// Can be called once per supervisor.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        let inbox = self
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RuntimeError::AlreadyRunning)?;
        let subs = std::mem::take(&mut *self.subscribers.lock().unwrap_or_else(PoisonError::into_inner));
        let events = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| self.bus.subscribe());

        let listener = Listener::spawn(&self.bus, events, subs);
        let signals = self.cfg.handle_signals.then(|| self.spawn_signal_listener());

        let result = Actor::new(self, inbox).run().await;

        if let Some(task) = signals {
            task.abort();
        }
        listener.finish().await;
        result
    }

    fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => request_shutdown(&bus, &token, signal),
                Err(e) => log::error!(target: "edgevisor", "cannot listen for termination signals: {e}"),
            }
        })
    }
}

/// Forwards bus events to the subscriber set until the run ends, then flushes.
struct Listener {
    task: JoinHandle<()>,
    done: CancellationToken,
}

impl Listener {
    fn spawn(bus: &Bus, mut rx: broadcast::Receiver<Event>, subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let set = SubscriberSet::new(subs, bus.clone());
        let done = CancellationToken::new();
        let stop = done.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!(target: "edgevisor", "subscriber listener lagged, {n} events skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => set.emit(&ev),
                                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        });

        Self { task, done }
    }

    async fn finish(self) {
        self.done.cancel();
        let _ = self.task.await;
    }
}

/// State owned by the running supervisor task.
struct Actor<'a> {
    sup: &'a Supervisor,
    inbox: mpsc::Receiver<ControlMessage>,
    worker: Option<Worker>,
    state: SupervisorState,
    generation: u64,
    crashes: u32,
    restart_at: Option<Instant>,
}

impl<'a> Actor<'a> {
    fn new(sup: &'a Supervisor, inbox: mpsc::Receiver<ControlMessage>) -> Self {
        Self {
            sup,
            inbox,
            worker: None,
            state: SupervisorState::Starting,
            generation: 0,
            crashes: 0,
            restart_at: None,
        }
    }

    async fn run(mut self) -> Result<(), RuntimeError> {
        let doc = match self.sup.store.load() {
            Ok(doc) => doc,
            Err(e) => return self.fail(RuntimeError::Config(e)).await,
        };
        if let Err(e) = self.start(&doc) {
            return self.fail(e).await;
        }
        self.set_state(SupervisorState::Running);

        loop {
            let restart_at = self.restart_at;
            tokio::select! {
                biased;
                _ = self.sup.shutdown.cancelled() => break,
                exit = next_exit(&mut self.worker) => {
                    if let Err(e) = self.on_crash(exit) {
                        return self.fail(e).await;
                    }
                }
                _ = tokio::time::sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                    if let Err(e) = self.restart_after_crash() {
                        return self.fail(e).await;
                    }
                }
                msg = self.inbox.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = self.reconfigure(msg).await {
                            return self.fail(e).await;
                        }
                    }
                    None => break,
                },
            }
        }

        self.terminate().await;
        Ok(())
    }

    async fn reconfigure(&mut self, msg: ControlMessage) -> Result<(), RuntimeError> {
        let topic = msg.topic.as_str();

        let doc = match ConfigDocument::parse(&msg.payload).and_then(|doc| {
            VariantKey::from_document(&doc).map_err(|e| ConfigError::Malformed {
                error: e.to_string(),
            })?;
            Ok(doc)
        }) {
            Ok(doc) => doc,
            Err(e) => {
                self.reject(topic, e.as_label(), e.to_string());
                return Ok(());
            }
        };
        if let Err(e) = self.sup.store.save(&doc) {
            self.reject(topic, e.as_label(), e.to_string());
            return Ok(());
        }

        self.set_state(SupervisorState::Reconfiguring);
        self.restart_at = None;
        self.crashes = 0;
        self.stop_worker().await;

        if self.sup.shutdown.is_cancelled() {
            log::info!(target: "edgevisor", "shutdown requested during reconfiguration; not starting a new worker");
            return Ok(());
        }

        let persisted = self.sup.store.load()?;
        self.start(&persisted)?;
        self.set_state(SupervisorState::Running);

        if let Some(w) = &self.worker {
            self.sup.bus.publish(
                Event::new(EventKind::ReconfigureApplied)
                    .with_worker(w.name_arc())
                    .with_generation(w.generation())
                    .with_topic(topic),
            );
        }
        Ok(())
    }

    fn reject(&self, topic: &str, label: &'static str, reason: String) {
        let mut ev = Event::new(EventKind::ReconfigureRejected)
            .with_topic(topic)
            .with_label(label)
            .with_reason(reason);
        if let Some(w) = &self.worker {
            ev = ev.with_worker(w.name_arc()).with_generation(w.generation());
        }
        self.sup.bus.publish(ev);
    }

    fn start(&mut self, doc: &ConfigDocument) -> Result<(), RuntimeError> {
        debug_assert!(self.worker.is_none(), "a worker is already running");
        self.generation += 1;
        let generation = self.generation;
        let bus = &self.sup.bus;

        let spec = LaunchSpec::from_document(doc, generation).map_err(WorkerError::from);
        let variant = match &spec {
            Ok(spec) => spec.key.to_string(),
            Err(_) => "unknown".to_string(),
        };
        bus.publish(
            Event::new(EventKind::WorkerStarting)
                .with_worker(variant.as_str())
                .with_generation(generation),
        );

        let launched = spec.and_then(|spec| {
            let launcher = self.sup.registry.resolve(&spec.key)?;
            launcher.launch(&spec, bus)
        });
        match launched {
            Ok(worker) => {
                bus.publish(
                    Event::new(EventKind::WorkerStarted)
                        .with_worker(worker.name_arc())
                        .with_generation(generation),
                );
                self.worker = Some(worker);
                Ok(())
            }
            Err(source) => {
                bus.publish(
                    Event::new(EventKind::WorkerStartFailed)
                        .with_worker(variant.as_str())
                        .with_generation(generation)
                        .with_label(source.as_label())
                        .with_reason(source.to_string()),
                );
                Err(RuntimeError::WorkerStart { variant, source })
            }
        }
    }

    /// Two-phase stop of the current worker, bounded by the grace period.
    async fn stop_worker(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        let grace = self.sup.cfg.grace;
        let bus = &self.sup.bus;
        let name = worker.name_arc();
        let generation = worker.generation();

        bus.publish(
            Event::new(EventKind::WorkerStopRequested)
                .with_worker(Arc::clone(&name))
                .with_generation(generation)
                .with_timeout(grace),
        );
        if let Err(e) = worker.request_stop() {
            log::warn!(target: "edgevisor", "{e}");
        }

        if worker.await_stop(grace).await {
            let exit = worker.exit_status().unwrap_or(WorkerExit::Success);
            bus.publish(
                Event::new(EventKind::WorkerStopped)
                    .with_worker(name)
                    .with_generation(generation)
                    .with_reason(exit.to_string()),
            );
            return;
        }

        bus.publish(
            Event::new(EventKind::WorkerStopTimeout)
                .with_worker(Arc::clone(&name))
                .with_generation(generation)
                .with_timeout(grace)
                .with_label("worker_stop_timeout")
                .with_reason(stop_timeout_message(&name, grace)),
        );
        worker.force_kill();
        if !worker.await_stop(KILL_REAP).await {
            log::error!(target: "edgevisor", "worker '{name}' still not reaped {KILL_REAP:?} after kill");
        }
        bus.publish(
            Event::new(EventKind::WorkerKilled)
                .with_worker(name)
                .with_generation(generation),
        );
    }

    fn on_crash(&mut self, exit: WorkerExit) -> Result<(), RuntimeError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.sup.bus.publish(
            Event::new(EventKind::WorkerExited)
                .with_worker(worker.name_arc())
                .with_generation(worker.generation())
                .with_label("worker_crashed")
                .with_reason(exit.to_string()),
        );

        match self.sup.cfg.crash_policy {
            CrashPolicy::Report => {
                log::warn!(target: "edgevisor", "no worker running until the next reconfiguration");
                Ok(())
            }
            CrashPolicy::Restart => {
                let delay = self.sup.cfg.crash_backoff.next(self.crashes);
                self.crashes = self.crashes.saturating_add(1);
                self.restart_at = Some(Instant::now() + delay);
                log::info!(target: "edgevisor", "restarting '{}' in {delay:?}", worker.name());
                Ok(())
            }
            CrashPolicy::Exit => Err(RuntimeError::Crashed {
                worker: worker.name().to_string(),
                reason: exit.to_string(),
            }),
        }
    }

    fn restart_after_crash(&mut self) -> Result<(), RuntimeError> {
        self.restart_at = None;
        let doc = self.sup.store.load()?;
        self.start(&doc)
    }

    async fn terminate(&mut self) {
        self.set_state(SupervisorState::ShuttingDown);

        self.inbox.close();
        while let Ok(msg) = self.inbox.try_recv() {
            self.sup.bus.publish(
                Event::new(EventKind::ReconfigureDropped)
                    .with_topic(msg.topic)
                    .with_label("submit_closed")
                    .with_reason("shutting down"),
            );
        }

        self.stop_worker().await;
        self.set_state(SupervisorState::Stopped);
        self.sup.bus.publish(Event::new(EventKind::ShutdownCompleted));
    }

    async fn fail(mut self, err: RuntimeError) -> Result<(), RuntimeError> {
        self.sup.bus.publish(
            Event::new(EventKind::RuntimeFailed)
                .with_label(err.as_label())
                .with_reason(err.to_string()),
        );
        self.stop_worker().await;
        self.set_state(SupervisorState::Stopped);
        Err(err)
    }

    fn set_state(&mut self, next: SupervisorState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_become(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        self.sup.bus.publish(
            Event::new(EventKind::StateChanged).with_reason(format!("{} -> {}", self.state, next)),
        );
        self.state = next;
    }
}

/// Completes when the current worker dies; never completes without one.
async fn next_exit(worker: &mut Option<Worker>) -> WorkerExit {
    match worker {
        Some(w) => w.exited().await,
        None => std::future::pending().await,
    }
}
