//! # Supervisor handle
//!
//! [`SupervisorHandle`] is the cloneable entry point into a running
//! supervisor: it queues control messages and requests termination. The
//! supervisor actor is the only consumer of the queue, so reconfigurations run
//! strictly one after another in delivery order.
//!
//! ```text
//! ControlLoop task ── on_message ──► try_submit ──► [bounded queue] ──► Supervisor actor
//!                                        │ full/closed
//!                                        └──► ReconfigureDropped
//! ```

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::control::MessageHandler;
use crate::error::SubmitError;
use crate::events::{Bus, Event, EventKind};

/// One inbound control message: a complete serialized configuration document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Raw payload (UTF-8 JSON document).
    pub payload: Vec<u8>,
}

impl ControlMessage {
    /// Creates a message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Cloneable handle to a supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<ControlMessage>,
    bus: Bus,
    shutdown: CancellationToken,
}

impl SupervisorHandle {
    pub(crate) fn new(tx: mpsc::Sender<ControlMessage>, bus: Bus, shutdown: CancellationToken) -> Self {
        Self { tx, bus, shutdown }
    }

    /// Queues a message, waiting for queue capacity.
    pub async fn submit(&self, msg: ControlMessage) -> Result<(), SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::Closed);
        }
        let topic = msg.topic.clone();
        self.tx.send(msg).await.map_err(|_| SubmitError::Closed)?;
        self.bus
            .publish(Event::new(EventKind::ReconfigureReceived).with_topic(topic));
        Ok(())
    }

    /// Queues a message without waiting.
    pub fn try_submit(&self, msg: ControlMessage) -> Result<(), SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::Closed);
        }
        let topic = msg.topic.clone();
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })?;
        self.bus
            .publish(Event::new(EventKind::ReconfigureReceived).with_topic(topic));
        Ok(())
    }

    /// Starts the termination protocol. Idempotent; returns immediately.
    ///
    /// Same routine as an OS termination signal.
    pub fn shutdown(&self) {
        request_shutdown(&self.bus, &self.shutdown, "requested");
    }

    /// True once termination has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Completes once termination has been requested.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await;
    }
}

impl MessageHandler for SupervisorHandle {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.try_submit(ControlMessage::new(topic, payload)) {
            self.bus.publish(
                Event::new(EventKind::ReconfigureDropped)
                    .with_topic(topic)
                    .with_label(e.as_label())
                    .with_reason(e.to_string()),
            );
        }
    }
}

/// Publishes `ShutdownRequested` once and cancels the runtime token.
pub(crate) fn request_shutdown(bus: &Bus, token: &CancellationToken, by: &'static str) {
    if token.is_cancelled() {
        return;
    }
    bus.publish(Event::new(EventKind::ShutdownRequested).with_reason(by));
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(capacity: usize) -> (SupervisorHandle, mpsc::Receiver<ControlMessage>, Bus) {
        let (tx, rx) = mpsc::channel(capacity);
        let bus = Bus::new(16);
        (SupervisorHandle::new(tx, bus.clone(), CancellationToken::new()), rx, bus)
    }

    #[tokio::test]
    async fn full_queue_drops_and_reports() {
        let (h, _rx, bus) = handle(1);
        let mut events = bus.subscribe();

        h.on_message("cfg", b"{}");
        h.on_message("cfg", b"{\"module\":\"wifi\"}");

        assert_eq!(events.recv().await.unwrap().kind, EventKind::ReconfigureReceived);
        let dropped = events.recv().await.unwrap();
        assert_eq!(dropped.kind, EventKind::ReconfigureDropped);
        assert_eq!(dropped.label, Some("submit_queue_full"));
    }

    #[tokio::test]
    async fn shutdown_closes_the_handle() {
        let (h, mut rx, bus) = handle(4);
        let mut events = bus.subscribe();

        h.shutdown();
        h.shutdown();
        assert!(h.is_shutting_down());
        assert_eq!(h.try_submit(ControlMessage::new("cfg", "{}")), Err(SubmitError::Closed));
        assert_eq!(h.submit(ControlMessage::new("cfg", "{}")).await, Err(SubmitError::Closed));
        assert!(rx.try_recv().is_err());

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ShutdownRequested);
        assert_eq!(ev.reason.as_deref(), Some("requested"));
        assert!(events.try_recv().is_err());
    }
}
