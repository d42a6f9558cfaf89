//! Runtime core: the supervisor and its lifecycle.
//!
//! Internal modules:
//! - [`supervisor`]: the single-owner actor (start, reconfigure, crash policy, terminate);
//! - [`handle`]: cloneable entry point (queue control messages, request shutdown);
//! - [`builder`]: wires store, registry and subscribers;
//! - [`config`]: runtime settings and crash policy;
//! - [`state`]: lifecycle states and legal transitions;
//! - [`shutdown`]: OS termination signals.

mod builder;
mod config;
mod handle;
mod shutdown;
mod state;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::{CrashPolicy, SupervisorConfig};
pub use handle::{ControlMessage, SupervisorHandle};
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::Supervisor;
