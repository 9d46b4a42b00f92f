#![allow(dead_code)]

use std::path::Path;
use xqzero::config::Config;
use xqzero::evaluator::{Evaluation, Model, ModelError};
use xqzero::model_store::{ArtifactPair, ModelLoadError, ModelLoader};
use xqzero::moves::{Action, CATALOGUE_SIZE};
use xqzero::rules::{Rules, RulesError, State, StepOutcome, Verdict};

/// Uniform policy, neutral value. Search visits stay evenly spread.
pub struct UniformModel;

impl Model for UniformModel {
    fn evaluate(&mut self, states: &[State]) -> Result<Vec<Evaluation>, ModelError> {
        Ok(states
            .iter()
            .map(|_| Evaluation {
                policy: vec![1.0 / CATALOGUE_SIZE as f32; CATALOGUE_SIZE],
                value: 0.0,
            })
            .collect())
    }
}

/// Fails every batch, taking the evaluator service down with it.
pub struct BrokenModel;

impl Model for BrokenModel {
    fn evaluate(&mut self, _states: &[State]) -> Result<Vec<Evaluation>, ModelError> {
        Err(ModelError("induced model failure".into()))
    }
}

pub struct UniformLoader;

impl ModelLoader for UniformLoader {
    fn load(&self, _artifacts: &ArtifactPair) -> Result<Box<dyn Model>, ModelLoadError> {
        Ok(Box::new(UniformModel))
    }
}

fn ladder_ply(state: &State) -> usize {
    state.as_str()[1..].parse().unwrap_or(0)
}

fn two_moves() -> Vec<Action> {
    vec!["0010".parse().unwrap(), "0001".parse().unwrap()]
}

/// A linear game: every move advances one rung, red wins at `win_at`
/// plies. With `forced_finish` the last rung is taken by a closing move
/// attached to the verdict instead of a searched one.
pub struct LadderRules {
    pub win_at: usize,
    pub forced_finish: bool,
}

impl Rules for LadderRules {
    fn initial_state(&self) -> State {
        State::new("n0")
    }

    fn legal_actions(&self, _state: &State) -> Vec<Action> {
        two_moves()
    }

    fn apply(&self, state: &State, _action: Action) -> Result<StepOutcome, RulesError> {
        Ok(StepOutcome {
            state: State::new(format!("n{}", ladder_ply(state) + 1)),
            captured: false,
        })
    }

    fn verdict(&self, state: &State) -> Verdict {
        let ply = ladder_ply(state);
        if self.forced_finish && ply + 1 == self.win_at {
            // Red to move and one forced move from victory.
            Verdict::Finished {
                value: 1.0,
                final_move: Some("0010".parse().unwrap()),
            }
        } else if !self.forced_finish && ply == self.win_at {
            // Black to move, red has won.
            Verdict::Finished {
                value: -1.0,
                final_move: None,
            }
        } else {
            Verdict::Ongoing { check: false }
        }
    }

    fn is_chase_or_check(&self, _state: &State, _successor: &State) -> bool {
        false
    }

    fn has_attacking_pieces(&self, _state: &State) -> bool {
        true
    }
}

/// Ladder evaluations slanted against red: every position with red to
/// move is scored as lost for the mover, every other as won.
pub struct RedLosingModel;

impl Model for RedLosingModel {
    fn evaluate(&mut self, states: &[State]) -> Result<Vec<Evaluation>, ModelError> {
        Ok(states
            .iter()
            .map(|state| Evaluation {
                policy: vec![1.0 / CATALOGUE_SIZE as f32; CATALOGUE_SIZE],
                value: if ladder_ply(state) % 2 == 0 { -1.0 } else { 1.0 },
            })
            .collect())
    }
}

/// Two positions bouncing into each other forever; only the repetition
/// filter can end this game.
pub struct CycleRules;

impl Rules for CycleRules {
    fn initial_state(&self) -> State {
        State::new("a")
    }

    fn legal_actions(&self, state: &State) -> Vec<Action> {
        if state.as_str() == "a" {
            vec!["0010".parse().unwrap()]
        } else {
            vec!["0001".parse().unwrap()]
        }
    }

    fn apply(&self, state: &State, _action: Action) -> Result<StepOutcome, RulesError> {
        let next = if state.as_str() == "a" { "b" } else { "a" };
        Ok(StepOutcome {
            state: State::new(next),
            captured: false,
        })
    }

    fn verdict(&self, _state: &State) -> Verdict {
        Verdict::Ongoing { check: false }
    }

    fn is_chase_or_check(&self, _state: &State, _successor: &State) -> bool {
        false
    }

    fn has_attacking_pieces(&self, _state: &State) -> bool {
        true
    }
}

/// The same two-position cycle, but red is in check on each of its
/// turns and every move out of a checked position counts as chase.
pub struct CheckCycleRules;

impl Rules for CheckCycleRules {
    fn initial_state(&self) -> State {
        State::new("a")
    }

    fn legal_actions(&self, state: &State) -> Vec<Action> {
        if state.as_str() == "a" {
            vec!["0010".parse().unwrap()]
        } else {
            vec!["0001".parse().unwrap()]
        }
    }

    fn apply(&self, state: &State, _action: Action) -> Result<StepOutcome, RulesError> {
        let next = if state.as_str() == "a" { "b" } else { "a" };
        Ok(StepOutcome {
            state: State::new(next),
            captured: false,
        })
    }

    fn verdict(&self, state: &State) -> Verdict {
        Verdict::Ongoing {
            check: state.as_str() == "a",
        }
    }

    fn is_chase_or_check(&self, state: &State, _successor: &State) -> bool {
        state.as_str() == "a"
    }

    fn has_attacking_pieces(&self, _state: &State) -> bool {
        true
    }
}

/// Small, fast settings; resignation stays disabled.
pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.resource.data_dir = data_dir.to_path_buf();
    config.play.max_workers = 1;
    config.play.pipe_pool_size = 1;
    config.play.search_threads = 1;
    config.play.simulation_num_per_move = 4;
    config.play.noise_eps = 0.0;
    config.play.max_game_length = 20;
    config.play.max_inter_game_pause = 0.0;
    config.play.enable_resign_rate = 1.0;
    config.play_data.nb_game_in_file = 2;
    config.play_data.min_store_plies = 3;
    config.eval.game_num = 2;
    config.eval.candidate_poll_secs = 1;
    config
}
