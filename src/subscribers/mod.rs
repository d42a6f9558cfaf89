//! # Event subscribers for the edgevisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in subscribers.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Supervisor / Worker / ControlLoop ── publish(Event) ──► Bus
//!                                                            │
//!                                       subscriber listener ─┘
//!                                                 │
//!                                         SubscriberSet::emit
//!                                 ┌───────────────┼────────────────┐
//!                                 ▼               ▼                ▼
//!                             LogWriter       Reporter     DetectionForwarder
//!                           (log facade)   (ReportSink)    (detection topic)
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use edgevisor::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct SwapCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait]
//! impl Subscribe for SwapCounter {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::ReconfigureApplied {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//! }
//! ```

mod embedded;
mod set;
mod subscribe;

pub use embedded::{DetectionForwarder, LogSink, LogWriter, Report, ReportSink, Reporter};
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
