//! Retry delay policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how delays evolve across consecutive failures (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Users
//! ```text
//! control::ControlLoop   broker reconnect delay after each connection error
//! core::Supervisor       delay before restarting a crashed worker (CrashPolicy::Restart)
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
