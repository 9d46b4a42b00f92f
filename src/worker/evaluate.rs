//! Evaluation worker: a candidate-vs-best tournament with alternating
//! colors.

use crate::config::Config;
use crate::evaluator::PipePool;
use crate::moves::ActionCatalogue;
use crate::rules::Rules;
use crate::search::{MctsPlayer, SearchTree};
use crate::worker::game::{play_game, GameEnd, Seats};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::info;

/// Accumulated tournament points: win 1, draw 1/2, loss 0. An aborted
/// game scores half a point for each side.
#[derive(Clone, Copy, Debug, Default)]
pub struct EvalScore {
    pub candidate: f64,
    pub best: f64,
    pub games: usize,
    pub aborted: usize,
}

impl EvalScore {
    /// Candidate's share of all points played for.
    pub fn candidate_share(&self) -> f64 {
        let total = self.candidate + self.best;
        if total > 0.0 {
            self.candidate / total
        } else {
            0.0
        }
    }

    pub fn merge(&mut self, other: &EvalScore) {
        self.candidate += other.candidate;
        self.best += other.best;
        self.games += other.games;
        self.aborted += other.aborted;
    }
}

pub struct EvaluateWorker {
    config: Config,
    rules: Arc<dyn Rules>,
    catalogue: Arc<ActionCatalogue>,
    rng: ChaCha8Rng,
}

impl EvaluateWorker {
    pub fn new(
        config: Config,
        rules: Arc<dyn Rules>,
        catalogue: Arc<ActionCatalogue>,
        seed: u64,
    ) -> EvaluateWorker {
        EvaluateWorker {
            config,
            rules,
            catalogue,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Play the configured number of games, the candidate taking red in
    /// every even-numbered game.
    pub fn run(&mut self, best_pool: &PipePool, candidate_pool: &PipePool) -> EvalScore {
        let mut score = EvalScore::default();
        for game in 0..self.config.eval.game_num {
            let candidate_is_red = game % 2 == 0;
            let (red_pool, black_pool) = if candidate_is_red {
                (candidate_pool, best_pool)
            } else {
                (best_pool, candidate_pool)
            };

            let mut seats = Seats::Pair {
                red: self.player(red_pool),
                black: self.player(black_pool),
            };
            let played = play_game(&self.config.play, self.rules.as_ref(), &mut seats);

            score.games += 1;
            if played.end == GameEnd::Aborted {
                score.aborted += 1;
                score.candidate += 0.5;
                score.best += 0.5;
            } else {
                let candidate_value = if candidate_is_red {
                    played.value_red
                } else {
                    -played.value_red
                };
                let points = (f64::from(candidate_value) + 1.0) / 2.0;
                score.candidate += points;
                score.best += 1.0 - points;
            }
            info!(
                game,
                candidate_is_red,
                end = ?played.end,
                candidate = score.candidate,
                best = score.best,
                "evaluation game finished"
            );
        }
        score
    }

    /// Tournament players always resign honestly and never share a tree
    /// with their opponent.
    fn player(&mut self, pool: &PipePool) -> MctsPlayer {
        MctsPlayer::new(
            self.config.play.clone(),
            Arc::clone(&self.rules),
            Arc::clone(&self.catalogue),
            Arc::new(SearchTree::new()),
            pool.acquire(),
            true,
            self.rng.gen(),
        )
    }
}
