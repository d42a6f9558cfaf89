//! # Runtime events emitted by the supervisor, workers and the control channel.
//!
//! The [`EventKind`] enum classifies event types across four groups:
//! - **Worker lifecycle**: start, stop request, stop/kill confirmation, unexpected exit, output lines
//! - **Reconfiguration**: control message received, applied, rejected or dropped
//! - **Runtime**: state changes, shutdown requested/completed, fatal errors
//! - **Channel and subscribers**: broker connectivity, subscriber overflow/panic
//!
//! The [`Event`] struct carries the optional metadata (worker name, generation,
//! topic, reason, timeout).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use edgevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerStopTimeout)
//!     .with_worker("camera/yolo")
//!     .with_generation(3)
//!     .with_timeout(Duration::from_secs(10));
//!
//! assert_eq!(ev.kind, EventKind::WorkerStopTimeout);
//! assert_eq!(ev.worker.as_deref(), Some("camera/yolo"));
//! assert_eq!(ev.timeout_ms, Some(10_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Runtime ===
    /// Supervisor moved between states.
    ///
    /// Sets: `reason` (`"Running -> Reconfiguring"`).
    StateChanged,

    /// Termination requested (OS signal or explicit shutdown).
    ///
    /// Sets: `reason` (`"signal"` or `"requested"`).
    ShutdownRequested,

    /// Termination protocol finished; the supervisor is stopped.
    ShutdownCompleted,

    /// The runtime hit a fatal condition and is about to exit non-zero.
    ///
    /// Sets: `reason` (error message), `label`.
    RuntimeFailed,

    // === Worker lifecycle ===
    /// A worker is about to be launched.
    ///
    /// Sets: `worker`, `generation`.
    WorkerStarting,

    /// A worker was launched and is running.
    ///
    /// Sets: `worker`, `generation`.
    WorkerStarted,

    /// Launching a worker failed.
    ///
    /// Sets: `worker`, `reason`, `label`.
    WorkerStartFailed,

    /// Cooperative termination was requested.
    ///
    /// Sets: `worker`, `generation`, `timeout_ms` (grace period).
    WorkerStopRequested,

    /// The worker stopped within its grace period.
    ///
    /// Sets: `worker`, `generation`, `reason` (exit description).
    WorkerStopped,

    /// The worker outlived its grace period.
    ///
    /// Sets: `worker`, `generation`, `timeout_ms`, `reason`.
    WorkerStopTimeout,

    /// The worker was terminated unconditionally.
    ///
    /// Sets: `worker`, `generation`.
    WorkerKilled,

    /// The worker died without being asked to stop.
    ///
    /// Sets: `worker`, `generation`, `reason` (exit description).
    WorkerExited,

    /// One line of worker output.
    ///
    /// Sets: `worker`, `generation`, `topic` (`stdout`/`stderr`), `reason` (the line).
    WorkerOutput,

    // === Reconfiguration ===
    /// A control message was accepted into the supervisor queue.
    ///
    /// Sets: `topic`.
    ReconfigureReceived,

    /// The new document is persisted and its worker is running.
    ///
    /// Sets: `worker`, `generation`.
    ReconfigureApplied,

    /// The message was rejected; the previous worker keeps running.
    ///
    /// Sets: `topic`, `reason`, `label`.
    ReconfigureRejected,

    /// The message never reached the supervisor (queue full or closed, or shutdown).
    ///
    /// Sets: `topic`, `reason`.
    ReconfigureDropped,

    // === Control channel ===
    /// Broker acknowledged the connection.
    ChannelConnected,

    /// Connection lost or refused.
    ///
    /// Sets: `reason`, `timeout_ms` (reconnect delay).
    ChannelDisconnected,

    /// Broker acknowledged the subscription request.
    ChannelSubscribed,

    // === Subscribers ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `worker` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `worker` (subscriber name), `reason`.
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker (or subscriber) name, if applicable.
    pub worker: Option<Arc<str>>,
    /// Worker generation (incremented on every launch).
    pub generation: Option<u64>,
    /// Control topic or output stream.
    pub topic: Option<Arc<str>>,
    /// Human-readable reason (errors, exit status, output line).
    pub reason: Option<Arc<str>>,
    /// Stable error label, see the `as_label()` helpers.
    pub label: Option<&'static str>,
    /// Timeout or delay in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            generation: None,
            topic: None,
            reason: None,
            label: None,
            timeout_ms: None,
        }
    }

    /// Attaches a worker name.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a worker generation.
    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Attaches a control topic or output stream name.
    #[inline]
    pub fn with_topic(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a stable error label.
    #[inline]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    /// Attaches a timeout or delay (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_worker(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_worker(subscriber)
            .with_reason(info)
    }

    /// True for events that describe a failure worth reporting to an external sink.
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::RuntimeFailed
                | EventKind::WorkerStartFailed
                | EventKind::WorkerStopTimeout
                | EventKind::WorkerExited
                | EventKind::ReconfigureRejected
                | EventKind::ReconfigureDropped
                | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::WorkerStarting);
        let b = Event::new(EventKind::WorkerStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn timeout_is_clamped_to_u32() {
        let ev = Event::new(EventKind::WorkerStopRequested)
            .with_timeout(Duration::from_secs(u64::from(u32::MAX)));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }

    #[test]
    fn failure_classification() {
        assert!(Event::new(EventKind::ReconfigureRejected).is_failure());
        assert!(Event::new(EventKind::WorkerExited).is_failure());
        assert!(!Event::new(EventKind::WorkerStarted).is_failure());
        assert!(!Event::new(EventKind::WorkerOutput).is_failure());
    }
}
