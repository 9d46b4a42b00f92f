//! MCTS self-play and evaluation engine for Chinese chess.
//!
//! The engine runs AlphaZero-style PUCT search guided by an external
//! policy/value network and drives two pipelines on top of it: self-play
//! workers that produce labeled game records for training, and an
//! evaluation tournament that decides whether a freshly trained candidate
//! model replaces the current best one.
//!
//! Board legality and the network are both plugged in from outside,
//! through [`rules::Rules`] and [`evaluator::Model`].

pub mod config;
pub mod evaluator;
pub mod model_store;
pub mod moves;
pub mod orchestrator;
pub mod records;
pub mod rules;
pub mod search;
pub mod worker;

pub use crate::config::Config;
pub use crate::evaluator::{Evaluation, Evaluator, Model, PipePool};
pub use crate::model_store::{ArtifactPair, ModelLoader, ModelStore};
pub use crate::moves::{Action, ActionCatalogue, CATALOGUE_SIZE};
pub use crate::orchestrator::{run_evaluation, run_self_play};
pub use crate::rules::{Rules, State, Verdict};
