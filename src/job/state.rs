use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The five states of a poll session.
///
/// Each session flows through: IDLE → POLLING (re-entered per attempt) →
/// SUCCEEDED | FAILED | TIMED_OUT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Succeeded | SessionState::Failed | SessionState::TimedOut
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::Polling => write!(f, "POLLING"),
            SessionState::Succeeded => write!(f, "SUCCEEDED"),
            SessionState::Failed => write!(f, "FAILED"),
            SessionState::TimedOut => write!(f, "TIMED_OUT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Guards the legal transitions of one session and records its history.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    history: Vec<SessionState>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// States left behind so far, oldest first.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Moves to `to` if the edge exists.
    ///
    /// - `Idle` may only start polling.
    /// - `Polling` may re-enter itself or end in any terminal state.
    /// - Terminal states accept nothing.
    pub fn advance(&mut self, to: SessionState) -> Result<SessionState, InvalidTransition> {
        let allowed = match self.state {
            SessionState::Idle => to == SessionState::Polling,
            SessionState::Polling => to != SessionState::Idle,
            SessionState::Succeeded | SessionState::Failed | SessionState::TimedOut => false,
        };
        if !allowed {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.history.push(self.state);
        self.state = to;
        Ok(to)
    }
}
