//! Self-play and evaluation workers sharing one game-loop state machine.

mod evaluate;
mod game;
mod self_play;

pub use crate::worker::evaluate::{EvalScore, EvaluateWorker};
pub use crate::worker::game::{play_game, GameEnd, PlayedGame, Seats};
pub use crate::worker::self_play::{SelfPlayReport, SelfPlayWorker};
