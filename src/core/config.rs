//! # Supervisor runtime configuration.
//!
//! Provides [`SupervisorConfig`], the settings of the supervisor itself (as
//! opposed to the [`ConfigDocument`](crate::ConfigDocument), which configures
//! the detection module). The binary fills it from CLI flags.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

/// What the supervisor does when the worker dies without being asked to stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CrashPolicy {
    /// Report the crash and keep running without a worker until the next
    /// reconfiguration.
    #[default]
    Report,
    /// Report, wait `crash_backoff`, then start again from the persisted document.
    Restart,
    /// Report and stop the runtime with [`RuntimeError::Crashed`](crate::RuntimeError::Crashed).
    Exit,
}

impl FromStr for CrashPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "report" => Ok(CrashPolicy::Report),
            "restart" => Ok(CrashPolicy::Restart),
            "exit" => Ok(CrashPolicy::Exit),
            other => Err(format!("unknown crash policy '{other}' (report|restart|exit)")),
        }
    }
}

impl fmt::Display for CrashPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrashPolicy::Report => "report",
            CrashPolicy::Restart => "restart",
            CrashPolicy::Exit => "exit",
        })
    }
}

/// Supervisor runtime settings.
///
/// ## Field semantics
/// - `grace`: bound on every stop (`request_stop` + `await_stop`), reconfiguration and shutdown alike
/// - `queue_capacity`: pending control messages; beyond it messages are dropped and reported
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `crash_policy`, `crash_backoff`: unexpected worker death handling
/// - `handle_signals`: install SIGINT/SIGTERM/SIGQUIT handlers in [`Supervisor::run`](crate::Supervisor::run)
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Cooperative stop window before a force kill.
    pub grace: Duration,
    /// Capacity of the control message queue.
    pub queue_capacity: usize,
    /// Capacity of the event bus.
    pub bus_capacity: usize,
    /// Unexpected worker death handling.
    pub crash_policy: CrashPolicy,
    /// Restart delay after consecutive crashes (`CrashPolicy::Restart`).
    pub crash_backoff: BackoffPolicy,
    /// Whether `run` listens for OS termination signals.
    pub handle_signals: bool,
}

impl SupervisorConfig {
    /// Returns a queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// - `grace = 10s`
    /// - `queue_capacity = 32`
    /// - `bus_capacity = 1024`
    /// - `crash_policy = Report`
    /// - `crash_backoff = 1s → 60s`, doubling, full jitter
    /// - `handle_signals = true`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            queue_capacity: 32,
            bus_capacity: 1024,
            crash_policy: CrashPolicy::Report,
            crash_backoff: BackoffPolicy {
                first: Duration::from_secs(1),
                max: Duration::from_secs(60),
                factor: 2.0,
                jitter: JitterPolicy::Full,
            },
            handle_signals: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_policy_parses_case_insensitively() {
        assert_eq!("Restart".parse::<CrashPolicy>(), Ok(CrashPolicy::Restart));
        assert_eq!("exit".parse::<CrashPolicy>(), Ok(CrashPolicy::Exit));
        assert!("reboot".parse::<CrashPolicy>().is_err());
        assert_eq!(CrashPolicy::default().to_string(), "report");
    }

    #[test]
    fn capacities_are_clamped() {
        let cfg = SupervisorConfig {
            queue_capacity: 0,
            bus_capacity: 0,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.queue_capacity_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.grace, Duration::from_secs(10));
    }
}
