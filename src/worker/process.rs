//! # Child-process backend
//!
//! [`ProcessLauncher`] runs each worker as a separate OS process. By default it
//! re-executes the agent binary with the internal `worker` subcommand; the
//! settings subtree travels in [`WORKER_CONFIG_ENV`].
//!
//! ```text
//! launch()
//!   ├─► spawn  <exe> worker --module M --submodule S    (new process group, stdout/stderr piped)
//!   ├─► relay  stdout ─► WorkerOutput{topic="stdout"}
//!   ├─► relay  stderr ─► WorkerOutput{topic="stderr"}
//!   └─► reaper select! {
//!           child.wait()  ─► exit_tx(Success | Failure(status))
//!           kill_rx       ─► SIGKILL group + wait ─► exit_tx(Killed)
//!       } ─► SIGKILL group (stray helpers)
//! ```
//!
//! Each worker leads its own process group, so the detector or capture
//! program it spawns shares the worker's fate. Cooperative stop is SIGTERM to
//! the worker alone; the worker maps it to cancellation and stops its helpers
//! itself. A force kill takes down the whole group.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};

use super::handle::{ExitSender, Worker, WorkerExit};
use super::launcher::{Launch, LaunchSpec};
use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};

/// Environment variable carrying the worker's settings subtree (JSON).
pub const WORKER_CONFIG_ENV: &str = "EDGEVISOR_WORKER_CONFIG";

type Check = Arc<dyn Fn(&Value) -> Result<(), WorkerError> + Send + Sync>;

/// Program, leading arguments and extra environment of a worker process.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    /// Executable.
    pub program: PathBuf,
    /// Arguments placed before the `worker` subcommand.
    pub args: Vec<String>,
    /// Extra environment.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates a spec for `program` with no extra arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }
}

/// Launches workers as child processes.
#[derive(Clone)]
pub struct ProcessLauncher {
    command: CommandSpec,
    check: Option<Check>,
}

impl ProcessLauncher {
    /// Launcher over an explicit command.
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            check: None,
        }
    }

    /// Launcher re-executing the current binary.
    pub fn self_exec() -> Result<Self, WorkerError> {
        let exe = std::env::current_exe().map_err(|source| WorkerError::Spawn {
            worker: "self".to_string(),
            source,
        })?;
        Ok(Self::new(CommandSpec::new(exe)))
    }

    /// Validates the settings subtree before spawning, so bad settings fail the
    /// start synchronously instead of as a crash.
    pub fn with_check(
        mut self,
        check: impl Fn(&Value) -> Result<(), WorkerError> + Send + Sync + 'static,
    ) -> Self {
        self.check = Some(Arc::new(check));
        self
    }

    fn command_for(&self, spec: &LaunchSpec) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .arg("worker")
            .arg("--module")
            .arg(&spec.key.module)
            .arg("--submodule")
            .arg(&spec.key.submodule)
            .envs(self.command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(WORKER_CONFIG_ENV, spec.subtree.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group: terminal signals skip the worker, and a kill reaches its helpers.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

impl Launch for ProcessLauncher {
    fn launch(&self, spec: &LaunchSpec, bus: &Bus) -> Result<Worker, WorkerError> {
        if let Some(check) = &self.check {
            check(&spec.subtree)?;
        }
        let name: Arc<str> = Arc::from(spec.key.to_string());

        let mut child = self
            .command_for(spec)
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                worker: name.to_string(),
                source,
            })?;
        let pid = child.id();

        if let Some(out) = child.stdout.take() {
            tokio::spawn(relay(out, bus.clone(), name.clone(), spec.generation, "stdout"));
        }
        if let Some(err) = child.stderr.take() {
            tokio::spawn(relay(err, bus.clone(), name.clone(), spec.generation, "stderr"));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(reap(child, pid, kill_rx, exit_tx));

        Ok(Worker::process(
            name,
            spec.generation,
            spec.subtree.clone(),
            pid,
            kill_tx,
            exit_rx,
        ))
    }
}

async fn relay<R>(reader: R, bus: Bus, worker: Arc<str>, generation: u64, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        bus.publish(
            Event::new(EventKind::WorkerOutput)
                .with_worker(Arc::clone(&worker))
                .with_generation(generation)
                .with_topic(stream)
                .with_reason(line),
        );
    }
}

async fn reap(
    mut child: Child,
    pid: Option<u32>,
    mut kill_rx: oneshot::Receiver<()>,
    exit_tx: ExitSender,
) {
    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(s) if s.success() => WorkerExit::Success,
            Ok(s) => WorkerExit::Failure(s.to_string()),
            Err(e) => WorkerExit::Failure(format!("wait failed: {e}")),
        },
        Ok(()) = &mut kill_rx => {
            if let Some(pgid) = pid {
                kill_group(pgid);
            }
            let _ = child.kill().await;
            WorkerExit::Killed
        }
    };
    // Helpers left behind by a crashed worker go with it.
    if let Some(pgid) = pid {
        kill_group(pgid);
    }
    exit_tx.send_replace(Some(outcome));
}

/// Sends SIGTERM to `pid`. A process that is already gone is not an error.
#[cfg(unix)]
pub(crate) fn send_terminate(pid: u32, worker: &str) -> Result<(), WorkerError> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| WorkerError::Signal {
        worker: worker.to_string(),
        error: format!("pid {pid} out of range"),
    })?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(WorkerError::Signal {
            worker: worker.to_string(),
            error: errno.desc().to_string(),
        }),
    }
}

/// SIGKILLs every process left in the worker's group.
#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => log::warn!(target: "edgevisor", "cannot kill process group {pgid}: {}", errno.desc()),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

#[cfg(not(unix))]
pub(crate) fn send_terminate(_pid: u32, worker: &str) -> Result<(), WorkerError> {
    Err(WorkerError::Signal {
        worker: worker.to_string(),
        error: "cooperative stop needs unix signals".to_string(),
    })
}

/// Stops a helper child (detector, capture program) owned by a module:
/// SIGTERM, wait up to `grace`, then SIGKILL.
pub(crate) async fn terminate_child(child: &mut Child, name: &str, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Some(pid) = child.id() {
        if let Err(e) = send_terminate(pid, name) {
            log::warn!(target: "edgevisor::worker", "{e}");
        }
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        log::warn!(target: "edgevisor::worker", "'{name}' ignored SIGTERM for {grace:?}; killing");
        let _ = child.kill().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::worker::VariantKey;

    fn shell(script: &str) -> ProcessLauncher {
        // `sh -c <script> worker --module ...`: the trailing arguments land in $0.. and are ignored.
        let mut cmd = CommandSpec::new("/bin/sh");
        cmd.args = vec!["-c".into(), script.into()];
        ProcessLauncher::new(cmd)
    }

    fn spec() -> LaunchSpec {
        LaunchSpec {
            key: VariantKey::new("test", "shell"),
            subtree: serde_json::json!({"k": 1}),
            generation: 7,
        }
    }

    #[tokio::test]
    async fn relays_output_and_stops_on_sigterm() {
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let launcher = shell("echo \"$EDGEVISOR_WORKER_CONFIG\"; exec sleep 30");

        let mut worker = launcher.launch(&spec(), &bus).unwrap();
        assert!(worker.is_alive());

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::WorkerOutput);
        assert_eq!(ev.reason.as_deref(), Some(r#"{"k":1}"#));
        assert_eq!(ev.generation, Some(7));

        worker.request_stop().unwrap();
        assert!(worker.await_stop(Duration::from_secs(5)).await);
        assert!(!worker.is_alive());
        assert!(matches!(worker.exit_status(), Some(WorkerExit::Failure(_))));
    }

    #[tokio::test]
    async fn force_kill_ends_a_process_ignoring_sigterm() {
        let bus = Bus::new(8);
        let launcher = shell("trap '' TERM; while :; do sleep 1; done");

        let mut worker = launcher.launch(&spec(), &bus).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        worker.request_stop().unwrap();
        assert!(!worker.await_stop(Duration::from_millis(300)).await);

        worker.force_kill();
        assert!(worker.await_stop(Duration::from_secs(5)).await);
        assert_eq!(worker.exit_status(), Some(WorkerExit::Killed));
    }

    #[tokio::test]
    async fn check_rejects_before_spawn() {
        let bus = Bus::new(8);
        let launcher = shell("exit 0").with_check(|_| Err(WorkerError::failed("bad settings")));
        let err = launcher.launch(&spec(), &bus).unwrap_err();
        assert_eq!(err.as_label(), "worker_failed");
    }

    /// True once `pid` no longer runs (gone, or a zombie awaiting its reaper).
    fn finished(pid: i32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), None).is_err() {
            return true;
        }
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| stat.contains(") Z "))
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn force_kill_takes_down_helper_processes() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let launcher = shell("trap '' TERM; sleep 1000 & echo $!; wait");

        let mut worker = launcher.launch(&spec(), &bus).unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::WorkerOutput);
        let helper: i32 = ev.reason.as_deref().unwrap().trim().parse().unwrap();
        assert!(!finished(helper));

        worker.request_stop().unwrap();
        assert!(!worker.await_stop(Duration::from_millis(300)).await);
        worker.force_kill();
        assert!(worker.await_stop(Duration::from_secs(5)).await);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !finished(helper) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "helper {helper} outlived its worker"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn worker_runs_in_its_own_process_group() {
        use nix::unistd::{Pid, getpgid};

        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let launcher = shell("echo $$; exec sleep 30");
        let mut worker = launcher.launch(&spec(), &bus).unwrap();

        let ev = rx.recv().await.unwrap();
        let pid: i32 = ev.reason.as_deref().unwrap().trim().parse().unwrap();
        let group = getpgid(Some(Pid::from_raw(pid))).unwrap();
        assert_eq!(group.as_raw(), pid);
        assert_ne!(group, getpgid(None).unwrap());

        worker.force_kill();
        assert!(worker.await_stop(Duration::from_secs(5)).await);
    }
}
