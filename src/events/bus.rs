//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] shared by every
//! publisher in the agent: the supervisor actor, worker handles and output
//! relays, and the control-channel loop.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                  Listener (one):
//!   Supervisor ──┐
//!   Worker     ──┼──────► Bus ───────► subscriber listener ────► SubscriberSet
//!   Relay      ──┤  (broadcast chan)     (in Supervisor)
//!   Control    ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    ///
    /// A receiver only gets events **sent after** it subscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receiver_sees_events_published_after_subscribe() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::WorkerStarting));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::WorkerStarted).with_worker("camera/yolo"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::WorkerStarted);
        assert_eq!(ev.worker.as_deref(), Some("camera/yolo"));
    }
}
