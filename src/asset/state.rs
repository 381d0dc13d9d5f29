//! Asset Resolution State Machine
//!
//! Tracks where each asset type is in the current resolution run and rejects
//! transitions that would break the at-most-once guarantee.
//!
//! # State Flow
//!
//! ```text
//! Unvisited
//!     ↓
//! Resolving ──→ Failed
//!     ↓
//! Resolved
//! ```
//!
//! `Resolved` and `Failed` are terminal for the lifetime of a run. Seeing an
//! asset that is still `Resolving` while descending means the dependency
//! graph has a cycle.

use std::fmt;
use thiserror::Error;

/// Resolution state of one asset type within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AssetState {
    /// Not reached by the resolver yet
    #[default]
    Unvisited,

    /// Dependencies are being resolved or the asset is loading/generating
    Resolving,

    /// Loaded from disk or generated (terminal state)
    Resolved,

    /// Dependency, load or generation failed (terminal state)
    Failed,
}

impl AssetState {
    /// Returns true if this is a terminal state (Resolved or Failed)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }

    /// Returns true if `target` is a legal next state
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Unvisited, Self::Resolving)
                | (Self::Resolving, Self::Resolved)
                | (Self::Resolving, Self::Failed)
        )
    }

    /// Validated transition.
    ///
    /// # Errors
    ///
    /// - `FromTerminalState` if already Resolved or Failed
    /// - `AlreadyInState` if `target` equals the current state
    /// - `Invalid` for any other illegal edge (e.g. Unvisited -> Resolved)
    pub fn transition(self, target: Self) -> Result<Self, AssetTransitionError> {
        if self.is_terminal() {
            return Err(AssetTransitionError::FromTerminalState { from: self });
        }
        if self == target {
            return Err(AssetTransitionError::AlreadyInState { state: target });
        }
        if !self.can_transition_to(target) {
            return Err(AssetTransitionError::Invalid {
                from: self,
                to: target,
            });
        }
        Ok(target)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Unvisited => "unvisited",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetTransitionError {
    /// Attempted to leave Resolved or Failed
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: AssetState },

    /// Attempted to re-enter the current state
    #[error("Already in state {state}")]
    AlreadyInState { state: AssetState },

    /// Attempted an edge the state machine does not have
    #[error("Cannot transition from {from} to {to}")]
    Invalid { from: AssetState, to: AssetState },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unvisited() {
        assert_eq!(AssetState::default(), AssetState::Unvisited);
    }

    #[test]
    fn test_happy_path() {
        let state = AssetState::Unvisited
            .transition(AssetState::Resolving)
            .expect("Unvisited -> Resolving");
        let state = state
            .transition(AssetState::Resolved)
            .expect("Resolving -> Resolved");
        assert!(state.is_terminal());
    }

    #[test]
    fn test_resolving_can_fail() {
        let state = AssetState::Resolving
            .transition(AssetState::Failed)
            .expect("Resolving -> Failed");
        assert_eq!(state, AssetState::Failed);
    }

    #[test]
    fn test_cannot_skip_resolving() {
        let err = AssetState::Unvisited
            .transition(AssetState::Resolved)
            .unwrap_err();
        assert!(matches!(err, AssetTransitionError::Invalid { .. }));
    }

    #[test]
    fn test_cannot_leave_terminal_states() {
        for terminal in [AssetState::Resolved, AssetState::Failed] {
            let err = terminal.transition(AssetState::Resolving).unwrap_err();
            assert!(matches!(err, AssetTransitionError::FromTerminalState { .. }));
        }
    }

    #[test]
    fn test_cannot_reenter_resolving() {
        let err = AssetState::Resolving
            .transition(AssetState::Resolving)
            .unwrap_err();
        assert_eq!(
            err,
            AssetTransitionError::AlreadyInState {
                state: AssetState::Resolving
            }
        );
    }

    #[test]
    fn test_error_display() {
        let err = AssetTransitionError::Invalid {
            from: AssetState::Unvisited,
            to: AssetState::Failed,
        };
        assert_eq!(err.to_string(), "Cannot transition from unvisited to failed");
    }
}
