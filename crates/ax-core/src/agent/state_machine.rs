//! Agent status state machine.
//!
//! Allowed transitions:
//!
//! ```text
//! idle <-> moving <-> interacting
//! idle -> planning -> {moving, interacting, idle}
//! any  -> learning -> previous
//! any  -> error    (terminal until reset)
//! idle -> offline  (terminal until restart)
//! ```
//!
//! Transitions are validated centrally: an invalid transition fails
//! with `InvalidTransition` and the caller forces the agent to
//! `error` without aborting the tick.

use serde::{Deserialize, Serialize};

use ax_common::{Error, Result};

/// Agent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Moving,
    Interacting,
    Planning,
    Learning,
    Offline,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Idle => "idle",
            Status::Moving => "moving",
            Status::Interacting => "interacting",
            Status::Planning => "planning",
            Status::Learning => "learning",
            Status::Offline => "offline",
            Status::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Validated status holder, remembering the pre-`learning` status so
/// learning can return to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachine {
    status: Status,
    before_learning: Option<Status>,
}

impl Default for StateMachine {
    fn default() -> Self {
        StateMachine {
            status: Status::Idle,
            before_learning: None,
        }
    }
}

impl StateMachine {
    pub fn status(&self) -> Status {
        self.status
    }

    /// True when the allowed-transition table permits `from -> to`.
    pub fn is_allowed(from: Status, to: Status, before_learning: Option<Status>) -> bool {
        use Status::*;
        if from == to {
            return true;
        }
        match (from, to) {
            // Terminal states admit nothing but explicit resets.
            (Error, _) | (Offline, _) => false,
            // Anything live may fail or start learning.
            (_, Error) | (_, Learning) => true,
            // Learning returns only to where it came from.
            (Learning, to) => before_learning.map(|p| p == to).unwrap_or(false),
            (Idle, Moving) | (Moving, Idle) => true,
            (Moving, Interacting) | (Interacting, Moving) => true,
            (Idle, Interacting) | (Interacting, Idle) => true,
            (Idle, Planning) => true,
            (Planning, Moving) | (Planning, Interacting) | (Planning, Idle) => true,
            (Idle, Offline) => true,
            _ => false,
        }
    }

    /// Attempt a transition.
    pub fn transition(&mut self, to: Status) -> Result<()> {
        let from = self.status;
        if !Self::is_allowed(from, to, self.before_learning) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if to == Status::Learning && from != Status::Learning {
            self.before_learning = Some(from);
        }
        if from == Status::Learning && to != Status::Learning {
            self.before_learning = None;
        }
        self.status = to;
        Ok(())
    }

    /// Force the error state; always permitted, even from terminals,
    /// so failure handling cannot itself fail.
    pub fn force_error(&mut self) {
        self.status = Status::Error;
        self.before_learning = None;
    }

    /// Explicit reset out of `error` back to `idle`.
    pub fn reset(&mut self) -> Result<()> {
        if self.status != Status::Error {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: "idle (reset)".to_string(),
            });
        }
        self.status = Status::Idle;
        self.before_learning = None;
        Ok(())
    }

    /// Explicit restart out of `offline` back to `idle`.
    pub fn restart(&mut self) -> Result<()> {
        if self.status != Status::Offline {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: "idle (restart)".to_string(),
            });
        }
        self.status = Status::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_cycle_is_allowed() {
        let mut sm = StateMachine::default();
        for status in [
            Status::Planning,
            Status::Moving,
            Status::Interacting,
            Status::Moving,
            Status::Idle,
        ] {
            sm.transition(status).unwrap();
        }
        assert_eq!(sm.status(), Status::Idle);
    }

    #[test]
    fn learning_returns_to_previous_only() {
        let mut sm = StateMachine::default();
        sm.transition(Status::Moving).unwrap();
        sm.transition(Status::Learning).unwrap();
        assert!(sm.transition(Status::Idle).is_err());
        sm.transition(Status::Moving).unwrap();
        assert_eq!(sm.status(), Status::Moving);
    }

    #[test]
    fn error_is_terminal_until_reset() {
        let mut sm = StateMachine::default();
        sm.transition(Status::Error).unwrap();
        assert!(sm.transition(Status::Idle).is_err());
        sm.reset().unwrap();
        assert_eq!(sm.status(), Status::Idle);
    }

    #[test]
    fn offline_is_terminal_until_restart() {
        let mut sm = StateMachine::default();
        sm.transition(Status::Offline).unwrap();
        assert!(sm.transition(Status::Moving).is_err());
        sm.restart().unwrap();
        assert_eq!(sm.status(), Status::Idle);
    }

    #[test]
    fn moving_cannot_go_offline() {
        let mut sm = StateMachine::default();
        sm.transition(Status::Moving).unwrap();
        let err = sm.transition(Status::Offline).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn planning_cannot_be_entered_from_moving() {
        let mut sm = StateMachine::default();
        sm.transition(Status::Moving).unwrap();
        assert!(sm.transition(Status::Planning).is_err());
    }

    #[test]
    fn force_error_always_succeeds() {
        let mut sm = StateMachine::default();
        sm.transition(Status::Offline).unwrap();
        sm.force_error();
        assert_eq!(sm.status(), Status::Error);
    }
}
