//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders every event through the `log` facade.
//! - [`Reporter`]: forwards failure events to a [`ReportSink`].
//! - [`DetectionForwarder`]: publishes worker detection lines to the broker.

mod forwarder;
mod log;
mod reporter;

pub use forwarder::DetectionForwarder;
pub use self::log::LogWriter;
pub use reporter::{LogSink, Report, ReportSink, Reporter};
