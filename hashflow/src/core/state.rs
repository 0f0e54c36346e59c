//! Stage lifecycle state.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a stage is in its lifecycle.
///
/// Transitions only move forward: `Created → Running → Draining → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Wired but not yet started.
    Created,
    /// Reading input, spawning and combining.
    Running,
    /// Input closed; finishing in-flight sub-tasks.
    Draining,
    /// Output queue closed. Terminal.
    Closed,
}

impl Default for StageState {
    fn default() -> Self {
        Self::Created
    }
}

impl StageState {
    /// Returns true if this is the terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Shared, forward-only holder for a stage's state.
#[derive(Debug, Default)]
pub struct StageStateCell {
    state: RwLock<StageState>,
}

impl StageStateCell {
    /// Creates a cell in the `Created` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> StageState {
        *self.state.read()
    }

    /// Moves to `next` if it is later than the current state.
    ///
    /// Returns true if the state changed.
    pub fn advance(&self, next: StageState) -> bool {
        let mut state = self.state.write();
        if next > *state {
            *state = next;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_created() {
        assert_eq!(StageStateCell::new().get(), StageState::Created);
    }

    #[test]
    fn test_forward_only() {
        let cell = StageStateCell::new();
        assert!(cell.advance(StageState::Running));
        assert!(cell.advance(StageState::Closed));
        assert!(!cell.advance(StageState::Draining));
        assert_eq!(cell.get(), StageState::Closed);
        assert!(cell.get().is_terminal());
    }

    #[test]
    fn test_skipping_draining_is_allowed() {
        let cell = StageStateCell::new();
        assert!(cell.advance(StageState::Closed));
        assert!(!cell.advance(StageState::Running));
    }
}
