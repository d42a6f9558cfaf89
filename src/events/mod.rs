//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the supervisor, worker handles,
//! output relays and the control channel.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` actor, `Worker` handles, output relays,
//!   `ControlLoop`, `SupervisorHandle` (dropped messages).
//! - **Consumers**: the supervisor's subscriber listener (fans out to
//!   `SubscriberSet`), and tests that subscribe directly.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
