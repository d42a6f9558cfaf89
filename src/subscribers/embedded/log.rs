//! # LogWriter: renders events through the `log` facade
//!
//! The binary installs `env_logger`, so `RUST_LOG` controls what is printed.
//! Failures go out at `error`/`warn`, lifecycle steps at `info`, worker output
//! and channel chatter at `debug`.
//!
//! ## Example output
//! ```text
//! [starting] worker="camera/yolo" gen=1
//! [started] worker="camera/yolo" gen=1
//! [reconfigure-received] topic="devices/pi-1/config"
//! [stop-requested] worker="camera/yolo" gen=1 grace=10000ms
//! [stopped] worker="camera/yolo" gen=1 exit="signal: 15 (SIGTERM)"
//! [reconfigure-applied] worker="wifi/native" gen=2
//! [reconfigure-rejected] topic="devices/pi-1/config" err="config_malformed: ..."
//! ```

use async_trait::async_trait;
use log::Level;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

const TARGET: &str = "edgevisor";

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn level(kind: EventKind) -> Level {
        match kind {
            EventKind::RuntimeFailed
            | EventKind::WorkerStartFailed
            | EventKind::WorkerExited
            | EventKind::SubscriberPanicked => Level::Error,
            EventKind::WorkerStopTimeout
            | EventKind::WorkerKilled
            | EventKind::ReconfigureRejected
            | EventKind::ReconfigureDropped
            | EventKind::ChannelDisconnected
            | EventKind::SubscriberOverflow => Level::Warn,
            EventKind::WorkerOutput | EventKind::ChannelSubscribed | EventKind::StateChanged => {
                Level::Debug
            }
            _ => Level::Info,
        }
    }

    fn render(e: &Event) -> String {
        let worker = e.worker.as_deref().unwrap_or("-");
        let generation = e.generation.unwrap_or(0);
        let topic = e.topic.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let label = e.label.unwrap_or("error");

        match e.kind {
            EventKind::StateChanged => format!("[state] {reason}"),
            EventKind::ShutdownRequested => format!("[shutdown-requested] by={reason}"),
            EventKind::ShutdownCompleted => "[shutdown-completed]".to_string(),
            EventKind::RuntimeFailed => format!("[runtime-failed] err=\"{label}: {reason}\""),
            EventKind::WorkerStarting => format!("[starting] worker={worker:?} gen={generation}"),
            EventKind::WorkerStarted => format!("[started] worker={worker:?} gen={generation}"),
            EventKind::WorkerStartFailed => {
                format!("[start-failed] worker={worker:?} err=\"{label}: {reason}\"")
            }
            EventKind::WorkerStopRequested => format!(
                "[stop-requested] worker={worker:?} gen={generation} grace={}ms",
                e.timeout_ms.unwrap_or(0)
            ),
            EventKind::WorkerStopped => {
                format!("[stopped] worker={worker:?} gen={generation} exit={reason:?}")
            }
            EventKind::WorkerStopTimeout => {
                format!("[stop-timeout] worker={worker:?} gen={generation} {reason}")
            }
            EventKind::WorkerKilled => format!("[killed] worker={worker:?} gen={generation}"),
            EventKind::WorkerExited => {
                format!("[exited] worker={worker:?} gen={generation} exit={reason:?}")
            }
            EventKind::WorkerOutput => format!("[{worker}#{generation} {topic}] {reason}"),
            EventKind::ReconfigureReceived => format!("[reconfigure-received] topic={topic:?}"),
            EventKind::ReconfigureApplied => {
                format!("[reconfigure-applied] worker={worker:?} gen={generation}")
            }
            EventKind::ReconfigureRejected => {
                format!("[reconfigure-rejected] topic={topic:?} err=\"{label}: {reason}\"")
            }
            EventKind::ReconfigureDropped => {
                format!("[reconfigure-dropped] topic={topic:?} reason={reason:?}")
            }
            EventKind::ChannelConnected => "[channel-connected]".to_string(),
            EventKind::ChannelDisconnected => format!(
                "[channel-disconnected] err={reason:?} retry_in={}ms",
                e.timeout_ms.unwrap_or(0)
            ),
            EventKind::ChannelSubscribed => "[channel-subscribed]".to_string(),
            EventKind::SubscriberOverflow => {
                format!("[subscriber-overflow] subscriber={worker:?} reason={reason:?}")
            }
            EventKind::SubscriberPanicked => {
                format!("[subscriber-panicked] subscriber={worker:?} info={reason:?}")
            }
        }
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let level = Self::level(e.kind);
        if log::log_enabled!(target: TARGET, level) {
            log::log!(target: TARGET, level, "{}", Self::render(e));
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn failures_are_loud_output_is_quiet() {
        assert_eq!(LogWriter::level(EventKind::WorkerExited), Level::Error);
        assert_eq!(LogWriter::level(EventKind::WorkerStopTimeout), Level::Warn);
        assert_eq!(LogWriter::level(EventKind::WorkerOutput), Level::Debug);
        assert_eq!(LogWriter::level(EventKind::WorkerStarted), Level::Info);
    }

    #[test]
    fn renders_stop_request_with_grace() {
        let ev = Event::new(EventKind::WorkerStopRequested)
            .with_worker("wifi/native")
            .with_generation(2)
            .with_timeout(Duration::from_secs(10));
        assert_eq!(
            LogWriter::render(&ev),
            "[stop-requested] worker=\"wifi/native\" gen=2 grace=10000ms"
        );
    }
}
