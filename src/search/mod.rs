//! Monte-Carlo Tree Search guided by the external policy/value evaluator.

mod node;
mod player;
mod tree;

pub use crate::search::node::{ActionStats, SearchNode};
pub use crate::search::player::{GameError, MctsPlayer};
pub use crate::search::tree::SearchTree;
