//! Facade over the board-rule engine.
//!
//! Legality, attack detection and termination belong to an external rule
//! library; the search and the workers only consume them through the
//! [`Rules`] trait. States are opaque single-line position notations,
//! compared and hashed by their encoding.

use crate::moves::Action;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Snapshot of the full board plus side to move, encoded as one line.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(String);

impl State {
    pub fn new(encoding: impl Into<String>) -> State {
        State(encoding.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "State({})", self.0)
    }
}

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("illegal move {action} in position {state}")]
    IllegalAction { state: State, action: Action },
    #[error("inconsistent position {state}: {reason}")]
    InvalidState { state: State, reason: String },
}

/// Result of applying a move.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub state: State,
    /// Whether the move captured a piece. Drives the no-progress counter.
    pub captured: bool,
}

/// Termination check result for a position.
#[derive(Clone, Debug)]
pub enum Verdict {
    /// Game goes on. `check` is set when the side to move is in check,
    /// which suspends the repetition filter for that ply.
    Ongoing { check: bool },
    /// Game is decided at this position.
    Finished {
        /// Outcome from the perspective of the side to move here:
        /// 1.0 win, -1.0 loss, 0.0 draw.
        value: f32,
        /// A forced extra move (e.g. the capture completing a mate) that
        /// must still be applied before the last state is recorded.
        final_move: Option<Action>,
    },
}

/// Pure-function interface to the rule engine.
pub trait Rules: Send + Sync {
    /// The standard opening position.
    fn initial_state(&self) -> State;

    /// All legal moves for the side to move. Empty when the mover is mated
    /// or stalemated.
    fn legal_actions(&self, state: &State) -> Vec<Action>;

    /// Apply a move, returning the successor position.
    fn apply(&self, state: &State, action: Action) -> Result<StepOutcome, RulesError>;

    /// Termination check for a position.
    fn verdict(&self, state: &State) -> Verdict;

    /// Whether moving from `state` into `successor` delivers check or sets
    /// up capturing pressure ("chase"). Exact chase semantics are owned by
    /// the rule engine.
    fn is_chase_or_check(&self, state: &State, successor: &State) -> bool;

    /// Whether any side still has attacking material. When neither does,
    /// the game is drawn immediately.
    fn has_attacking_pieces(&self, state: &State) -> bool;
}
