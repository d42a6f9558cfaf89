//! # Reporter: forwards failures to an external sink
//!
//! The reporter watches the bus for failure events (see [`Event::is_failure`])
//! and hands a compact [`Report`] to a [`ReportSink`]. Sinks are fire-and-forget:
//! a sink error is logged and otherwise ignored.
//!
//! Built-in sinks:
//! - [`LogSink`] writes reports through the `log` facade (default).
//! - [`TopicSink`](crate::control::TopicSink) publishes JSON reports to a control-channel topic.

use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde::Serialize;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// One reported failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    /// Stable label (`config_malformed`, `worker_unknown_variant`, ...), or the event kind.
    pub label: String,
    /// Which step failed (`reconfigure`, `start`, `stop`, `crash`, `runtime`, ...).
    pub step: &'static str,
    /// Worker involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    /// Control topic involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Human-readable details.
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub at_ms: u64,
}

impl Report {
    /// Builds a report from a failure event.
    pub fn from_event(ev: &Event) -> Self {
        let step = match ev.kind {
            EventKind::ReconfigureRejected | EventKind::ReconfigureDropped => "reconfigure",
            EventKind::WorkerStartFailed => "start",
            EventKind::WorkerStopTimeout => "stop",
            EventKind::WorkerExited => "crash",
            EventKind::SubscriberPanicked => "subscriber",
            _ => "runtime",
        };
        let label = match ev.label {
            Some(l) => l.to_string(),
            None => format!("{:?}", ev.kind),
        };
        let at_ms = ev
            .at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .min(u128::from(u64::MAX)) as u64;

        Self {
            label,
            step,
            worker: ev.worker.as_deref().map(str::to_owned),
            topic: ev.topic.as_deref().map(str::to_owned),
            message: ev.reason.as_deref().unwrap_or_default().to_owned(),
            at_ms,
        }
    }
}

/// Destination for failure reports.
#[async_trait]
pub trait ReportSink: Send + Sync + 'static {
    /// Delivers one report. Errors are logged by the caller, never retried.
    async fn report(&self, report: &Report) -> Result<(), String>;
}

/// Writes reports through the `log` facade.
#[derive(Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn report(&self, r: &Report) -> Result<(), String> {
        log::error!(
            target: "edgevisor::report",
            "step={} label={} worker={} topic={} {}",
            r.step,
            r.label,
            r.worker.as_deref().unwrap_or("-"),
            r.topic.as_deref().unwrap_or("-"),
            r.message
        );
        Ok(())
    }
}

/// Subscriber forwarding failure events to a [`ReportSink`].
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
}

impl Reporter {
    /// Creates a reporter over the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Subscribe for Reporter {
    async fn on_event(&self, ev: &Event) {
        if !ev.is_failure() {
            return;
        }
        let report = Report::from_event(ev);
        if let Err(e) = self.sink.report(&report).await {
            log::warn!(target: "edgevisor", "report sink failed for '{}': {e}", report.label);
        }
    }

    fn name(&self) -> &'static str {
        "Reporter"
    }

    fn queue_capacity(&self) -> usize {
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<Report>>);

    #[async_trait]
    impl ReportSink for Capture {
        async fn report(&self, report: &Report) -> Result<(), String> {
            self.0.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn only_failures_reach_the_sink() {
        let sink = Arc::new(Capture::default());
        let reporter = Reporter::new(sink.clone());

        reporter
            .on_event(&Event::new(EventKind::WorkerStarted).with_worker("camera/yolo"))
            .await;
        reporter
            .on_event(
                &Event::new(EventKind::ReconfigureRejected)
                    .with_topic("cfg")
                    .with_label("config_malformed")
                    .with_reason("expected value at line 1"),
            )
            .await;

        let seen = sink.0.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].label, "config_malformed");
        assert_eq!(seen[0].step, "reconfigure");
        assert_eq!(seen[0].topic.as_deref(), Some("cfg"));
    }

    #[test]
    fn unlabelled_events_use_kind_name() {
        let r = Report::from_event(&Event::new(EventKind::WorkerExited).with_worker("wifi/native"));
        assert_eq!(r.label, "WorkerExited");
        assert_eq!(r.step, "crash");
        assert!(r.at_ms > 0);
    }
}
