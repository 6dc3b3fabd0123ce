//! Authentication cycle state machine.
//!
//! One cycle per detected tag:
//!
//! ```text
//! Idle -> TagPresent -> Authenticated -> DataRead -> Granted -> Idle
//!              │              │              └────> Denied ──┘
//!              │              └──> ReadFailed ─────> Denied
//!              ├──> AuthFailed ──────────────────> Denied
//!              └──> Denied            (unsupported tag)
//! ```
//!
//! # Examples
//!
//! ```
//! use latchkey_controller::{AccessState, AuthCycle};
//!
//! let mut cycle = AuthCycle::new();
//! cycle.transition_to(AccessState::TagPresent).unwrap();
//! assert!(cycle.transition_to(AccessState::Granted).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;

use latchkey_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Maximum number of state transitions to keep in history.
///
/// A full cycle is at most five transitions, so this covers the last twenty
/// or so tags.
const MAX_HISTORY_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessState {
    /// Polling for a tag.
    Idle,
    /// A target entered the field.
    TagPresent,
    /// Sector key accepted.
    Authenticated,
    /// Sector key rejected.
    AuthFailed,
    /// Data block read.
    DataRead,
    /// Data block unreadable.
    ReadFailed,
    Granted,
    Denied,
}

impl fmt::Display for AccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessState::Idle => "Idle",
            AccessState::TagPresent => "TagPresent",
            AccessState::Authenticated => "Authenticated",
            AccessState::AuthFailed => "AuthFailed",
            AccessState::DataRead => "DataRead",
            AccessState::ReadFailed => "ReadFailed",
            AccessState::Granted => "Granted",
            AccessState::Denied => "Denied",
        };
        f.write_str(name)
    }
}

impl AccessState {
    /// Check if transition to target state is valid from this state.
    pub fn can_transition_to(&self, target: &AccessState) -> bool {
        matches!(
            (self, target),
            (AccessState::Idle, AccessState::TagPresent)
                | (
                    AccessState::TagPresent,
                    AccessState::Authenticated | AccessState::AuthFailed | AccessState::Denied
                )
                | (
                    AccessState::Authenticated,
                    AccessState::DataRead | AccessState::ReadFailed
                )
                | (AccessState::AuthFailed, AccessState::Denied)
                | (AccessState::ReadFailed, AccessState::Denied)
                | (AccessState::DataRead, AccessState::Granted | AccessState::Denied)
                | (AccessState::Granted, AccessState::Idle)
                | (AccessState::Denied, AccessState::Idle)
        )
    }

    /// `true` for the two terminal outcomes of a cycle.
    pub fn is_outcome(&self) -> bool {
        matches!(self, AccessState::Granted | AccessState::Denied)
    }
}

/// A single state transition with timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: AccessState,
    pub to: AccessState,
    pub timestamp: Instant,
}

/// Validating state machine for one reader.
#[derive(Debug)]
pub struct AuthCycle {
    current_state: AccessState,
    history: VecDeque<StateTransition>,
}

impl AuthCycle {
    /// Create a new machine in the `Idle` state.
    pub fn new() -> Self {
        Self {
            current_state: AccessState::Idle,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> AccessState {
        self.current_state
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The states visited, in order, since the last time the machine left
    /// `Idle`. Empty while idle with no completed cycle.
    pub fn last_cycle(&self) -> Vec<AccessState> {
        let start = self
            .history
            .iter()
            .rposition(|t| t.from == AccessState::Idle)
            .unwrap_or(self.history.len());
        self.history.iter().skip(start).map(|t| t.to).collect()
    }

    /// Transition to `new_state`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the transition is not
    /// allowed from the current state; the machine is left unchanged.
    pub fn transition_to(&mut self, new_state: AccessState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
        };

        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
        self.current_state = new_state;
        Ok(transition)
    }

    /// Force the machine back to `Idle` without recording a transition.
    pub fn reset(&mut self) {
        self.current_state = AccessState::Idle;
    }
}

impl Default for AuthCycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn walk(states: &[AccessState]) -> AuthCycle {
        let mut cycle = AuthCycle::new();
        for state in states {
            cycle.transition_to(*state).unwrap();
        }
        cycle
    }

    #[test]
    fn test_new_machine_starts_idle() {
        let cycle = AuthCycle::new();
        assert_eq!(cycle.current_state(), AccessState::Idle);
        assert!(cycle.history().is_empty());
        assert!(cycle.last_cycle().is_empty());
    }

    #[rstest]
    #[case(&[AccessState::TagPresent, AccessState::Authenticated, AccessState::DataRead, AccessState::Granted, AccessState::Idle])]
    #[case(&[AccessState::TagPresent, AccessState::Authenticated, AccessState::DataRead, AccessState::Denied, AccessState::Idle])]
    #[case(&[AccessState::TagPresent, AccessState::AuthFailed, AccessState::Denied, AccessState::Idle])]
    #[case(&[AccessState::TagPresent, AccessState::Authenticated, AccessState::ReadFailed, AccessState::Denied, AccessState::Idle])]
    #[case(&[AccessState::TagPresent, AccessState::Denied, AccessState::Idle])]
    fn test_valid_cycles(#[case] states: &[AccessState]) {
        let cycle = walk(states);
        assert_eq!(cycle.current_state(), AccessState::Idle);
        assert_eq!(cycle.last_cycle(), states.to_vec());
    }

    #[rstest]
    #[case(AccessState::Idle, AccessState::Granted)]
    #[case(AccessState::Idle, AccessState::Idle)]
    #[case(AccessState::TagPresent, AccessState::Granted)]
    #[case(AccessState::AuthFailed, AccessState::Granted)]
    #[case(AccessState::ReadFailed, AccessState::DataRead)]
    #[case(AccessState::Granted, AccessState::Denied)]
    fn test_invalid_transitions(#[case] from: AccessState, #[case] to: AccessState) {
        assert!(!from.can_transition_to(&to));
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut cycle = AuthCycle::new();
        let error = cycle.transition_to(AccessState::Granted).unwrap_err();
        assert_eq!(
            error,
            Error::InvalidStateTransition {
                from: "Idle".to_string(),
                to: "Granted".to_string()
            }
        );
        assert_eq!(cycle.current_state(), AccessState::Idle);
        assert!(cycle.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut cycle = AuthCycle::new();
        for _ in 0..60 {
            cycle.transition_to(AccessState::TagPresent).unwrap();
            cycle.transition_to(AccessState::Denied).unwrap();
            cycle.transition_to(AccessState::Idle).unwrap();
        }
        assert_eq!(cycle.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(cycle.history().back().unwrap().to, AccessState::Idle);
    }

    #[test]
    fn test_reset() {
        let mut cycle = walk(&[AccessState::TagPresent]);
        cycle.reset();
        assert_eq!(cycle.current_state(), AccessState::Idle);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&AccessState::AuthFailed).unwrap();
        assert_eq!(json, "\"auth_failed\"");
        assert!(AccessState::Granted.is_outcome());
        assert!(!AccessState::DataRead.is_outcome());
    }
}
