//! Supervisor lifecycle states.
//!
//! ```text
//! Starting ──► Running ◄──► Reconfiguring
//!                 │              │
//!                 └──► ShuttingDown ◄──┘
//!                          │
//!                       Stopped
//! ```
//!
//! `Starting` and `Reconfiguring` may also fail straight to `Stopped` when no
//! worker can be started.

use std::fmt;

/// Where the supervisor is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SupervisorState {
    Starting,
    Running,
    Reconfiguring,
    ShuttingDown,
    Stopped,
}

impl SupervisorState {
    /// Whether `self → next` is a legal transition.
    pub(crate) fn can_become(self, next: SupervisorState) -> bool {
        use SupervisorState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, ShuttingDown)
                | (Starting, Stopped)
                | (Running, Reconfiguring)
                | (Running, ShuttingDown)
                | (Running, Stopped)
                | (Reconfiguring, Running)
                | (Reconfiguring, ShuttingDown)
                | (Reconfiguring, Stopped)
                | (ShuttingDown, Stopped)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::SupervisorState::*;

    #[test]
    fn legal_transitions() {
        assert!(Starting.can_become(Running));
        assert!(Running.can_become(Reconfiguring));
        assert!(Reconfiguring.can_become(Running));
        assert!(Reconfiguring.can_become(ShuttingDown));
        assert!(ShuttingDown.can_become(Stopped));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Stopped.can_become(Running));
        assert!(!ShuttingDown.can_become(Running));
        assert!(!Starting.can_become(Reconfiguring));
        assert!(!Running.can_become(Running));
    }
}
