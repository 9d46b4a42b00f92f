//! The MCTS player: repeated PUCT simulations from a root position,
//! producing a move and a visit-count policy over the action catalogue.

use crate::config::PlayConfig;
use crate::evaluator::{EvaluatorError, PooledPipe};
use crate::moves::{Action, ActionCatalogue};
use crate::rules::{Rules, RulesError, State, Verdict};
use crate::search::tree::SearchTree;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::Gamma;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Per-game failure. Aborts the affected game only, never the worker.
#[derive(Debug, Error)]
pub enum GameError {
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Simulations give up on paths longer than this; a transposition-keyed
/// tree can revisit a position within one simulation.
const MAX_SIMULATION_DEPTH: usize = 200;

pub struct MctsPlayer {
    play: PlayConfig,
    rules: Arc<dyn Rules>,
    catalogue: Arc<ActionCatalogue>,
    tree: Arc<SearchTree>,
    pipe: Option<PooledPipe>,
    enable_resign: bool,
    /// Consecutive plies with the root value below the resign threshold,
    /// tracked per side so the opponent's plies cannot reset the streak.
    low_value_plies: [usize; 2],
    rng: ChaCha8Rng,
}

impl MctsPlayer {
    pub fn new(
        play: PlayConfig,
        rules: Arc<dyn Rules>,
        catalogue: Arc<ActionCatalogue>,
        tree: Arc<SearchTree>,
        pipe: PooledPipe,
        enable_resign: bool,
        seed: u64,
    ) -> MctsPlayer {
        MctsPlayer {
            play,
            rules,
            catalogue,
            tree,
            pipe: Some(pipe),
            enable_resign,
            low_value_plies: [0; 2],
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Search from `state` and pick a move.
    ///
    /// Returns `(None, policy)` when the player resigns: no legal move,
    /// every searched move leads into `forbidden_successors`, or the root
    /// value has stayed below the resign threshold for long enough.
    pub fn action(
        &mut self,
        state: &State,
        ply: usize,
        forbidden_successors: Option<&HashSet<State>>,
    ) -> Result<(Option<Action>, Vec<f32>), GameError> {
        let legal = self.rules.legal_actions(state);
        if legal.is_empty() {
            return Ok((None, vec![0.0; self.catalogue.len()]));
        }

        self.ensure_root_expanded(state, ply)?;
        self.mix_root_noise(state);
        self.run_simulations(state, ply)?;

        if let Some(forbidden) = forbidden_successors {
            self.forbid_successors(state, forbidden)?;
        }

        let root = self.tree.get_or_create(state);
        let (visits, root_value) = {
            let root = root.lock().expect("node lock poisoned");
            let visits: Vec<(Action, u32)> = root
                .legal_actions()
                .iter()
                .map(|&a| (a, root.stats(a).map(|s| s.n).unwrap_or(0)))
                .collect();
            (visits, root.best_value().unwrap_or(0.0))
        };
        let policy = self.visit_policy(&visits, ply);

        let total: u32 = visits.iter().map(|(_, n)| n).sum();
        if total == 0 {
            debug!(%state, ply, "all moves forbidden, resigning");
            return Ok((None, policy));
        }

        if self.should_resign(root_value, ply) {
            debug!(%state, ply, root_value, "root value below threshold, resigning");
            return Ok((None, policy));
        }

        Ok((Some(self.pick_action(&visits, ply)), policy))
    }

    /// Release the evaluator pipe back to its pool. Idempotent; also runs
    /// on drop so abort paths cannot leak the pipe.
    pub fn close(&mut self) {
        self.pipe.take();
    }

    fn pipe(&self) -> Result<&PooledPipe, GameError> {
        self.pipe
            .as_ref()
            .ok_or(GameError::Evaluator(EvaluatorError::Unavailable))
    }

    fn ensure_root_expanded(&self, state: &State, ply: usize) -> Result<(), GameError> {
        let expanded = self
            .tree
            .get(state)
            .map(|n| n.lock().expect("node lock poisoned").expanded)
            .unwrap_or(false);
        if !expanded {
            self.expand_leaf(state, ply)?;
        }
        Ok(())
    }

    /// Mix Dirichlet noise into the root priors for exploration diversity
    /// across self-play games.
    fn mix_root_noise(&mut self, state: &State) {
        let eps = self.play.noise_eps;
        if eps <= 0.0 {
            return;
        }
        let Some(root) = self.tree.get(state) else {
            return;
        };
        let mut root = root.lock().expect("node lock poisoned");
        let actions: Vec<Action> = root.legal_actions().to_vec();
        if actions.is_empty() {
            return;
        }

        // Dirichlet sampling via normalized Gamma variates.
        let gamma = Gamma::new(self.play.dirichlet_alpha as f64, 1.0)
            .expect("dirichlet alpha is positive");
        let mut noise: Vec<f32> = (0..actions.len())
            .map(|_| gamma.sample(&mut self.rng) as f32)
            .collect();
        let sum: f32 = noise.iter().sum();
        if sum <= 0.0 {
            return;
        }
        for n in &mut noise {
            *n /= sum;
        }

        for (action, n) in actions.into_iter().zip(noise) {
            if let Some(s) = root.stats_mut(action) {
                s.p = (1.0 - eps) * s.p + eps * n;
            }
        }
    }

    fn run_simulations(&self, state: &State, ply: usize) -> Result<(), GameError> {
        let total = self.play.simulation_num_per_move;
        let threads = self.play.search_threads.max(1);

        if threads == 1 {
            for _ in 0..total {
                self.simulate(state, ply)?;
            }
            return Ok(());
        }

        let counter = AtomicUsize::new(0);
        let failure: Mutex<Option<GameError>> = Mutex::new(None);

        crossbeam::thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|_| loop {
                    if counter.fetch_add(1, Ordering::AcqRel) >= total {
                        break;
                    }
                    if failure.lock().expect("failure lock poisoned").is_some() {
                        break;
                    }
                    if let Err(err) = self.simulate(state, ply) {
                        failure
                            .lock()
                            .expect("failure lock poisoned")
                            .get_or_insert(err);
                        break;
                    }
                });
            }
        })
        .expect("could not join simulation threads");

        match failure.into_inner().expect("failure lock poisoned") {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// One simulation: select down to a leaf, evaluate or read the
    /// terminal value, back it up with virtual losses reverted.
    fn simulate(&self, root: &State, root_ply: usize) -> Result<(), GameError> {
        let mut state = root.clone();
        let mut path: Vec<(State, Action)> = Vec::new();

        let leaf_value = loop {
            if let Verdict::Finished { value, .. } = self.rules.verdict(&state) {
                break value;
            }
            if path.len() >= MAX_SIMULATION_DEPTH {
                break 0.0;
            }

            let node = self.tree.get(&state);
            let expanded = node
                .as_ref()
                .map(|n| n.lock().expect("node lock poisoned").expanded)
                .unwrap_or(false);
            if !expanded {
                break self.expand_leaf(&state, root_ply + path.len())?;
            }

            let node = node.expect("expanded node exists");
            let selected = {
                let mut node = node.lock().expect("node lock poisoned");
                match node.select(self.play.c_puct) {
                    Some(action) => {
                        node.apply_virtual_loss(action);
                        action
                    }
                    // Mover has no move at a non-terminal position: lost.
                    None => break -1.0,
                }
            };
            path.push((state.clone(), selected));
            state = self.rules.apply(&state, selected)?.state;
        };

        self.tree.backup(&path, leaf_value);
        Ok(())
    }

    /// Query the evaluator for a leaf, install priors over its legal
    /// actions and return the leaf value for backup.
    fn expand_leaf(&self, state: &State, ply: usize) -> Result<f32, GameError> {
        let legal = self.rules.legal_actions(state);
        if legal.is_empty() {
            return Ok(-1.0);
        }

        let evaluation = self.pipe()?.evaluate(state)?;
        let flipped = ply % 2 == 1;

        let mut priors: Vec<(Action, f32)> = legal
            .into_iter()
            .map(|action| {
                let index = if flipped {
                    self.catalogue.flipped_index_of(action)
                } else {
                    self.catalogue.index_of(action)
                };
                let p = index
                    .map(|i| evaluation.policy.get(i).copied().unwrap_or(0.0))
                    .unwrap_or(0.0);
                (action, p.max(0.0))
            })
            .collect();

        let sum: f32 = priors.iter().map(|(_, p)| p).sum();
        if sum > 0.0 {
            for (_, p) in &mut priors {
                *p /= sum;
            }
        } else {
            // Evaluator put no mass on any legal move; fall back to uniform.
            let uniform = 1.0 / priors.len() as f32;
            for (_, p) in &mut priors {
                *p = uniform;
            }
        }

        self.tree
            .get_or_create(state)
            .lock()
            .expect("node lock poisoned")
            .expand(priors);
        Ok(evaluation.value)
    }

    /// Zero the visits of every root move whose successor is forbidden by
    /// the repetition filter.
    fn forbid_successors(
        &self,
        state: &State,
        forbidden: &HashSet<State>,
    ) -> Result<(), GameError> {
        if forbidden.is_empty() {
            return Ok(());
        }
        let root = self.tree.get_or_create(state);
        let actions: Vec<Action> = root
            .lock()
            .expect("node lock poisoned")
            .legal_actions()
            .to_vec();
        for action in actions {
            let successor = self.rules.apply(state, action)?.state;
            if forbidden.contains(&successor) {
                root.lock()
                    .expect("node lock poisoned")
                    .zero_visits(action);
            }
        }
        Ok(())
    }

    /// Dense policy vector over the catalogue from root visit counts,
    /// permuted through the flip table when the mover plays the rotated
    /// orientation.
    fn visit_policy(&self, visits: &[(Action, u32)], ply: usize) -> Vec<f32> {
        let mut policy = vec![0.0f32; self.catalogue.len()];
        let total: u32 = visits.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return policy;
        }
        let flipped = ply % 2 == 1;
        for &(action, n) in visits {
            let index = if flipped {
                self.catalogue.flipped_index_of(action)
            } else {
                self.catalogue.index_of(action)
            };
            if let Some(i) = index {
                policy[i] = n as f32 / total as f32;
            }
        }
        policy
    }

    fn should_resign(&mut self, root_value: f32, ply: usize) -> bool {
        if !self.enable_resign || ply < self.play.min_resign_ply {
            return false;
        }
        let side = ply % 2;
        if root_value <= self.play.resign_threshold {
            self.low_value_plies[side] += 1;
        } else {
            self.low_value_plies[side] = 0;
        }
        self.low_value_plies[side] >= self.play.resign_persist_plies
    }

    /// Early plies sample proportionally to tempered visit counts, later
    /// plies play the max-visit move.
    fn pick_action(&mut self, visits: &[(Action, u32)], ply: usize) -> Action {
        let tau = self.play.tau_decay_rate.powi(ply as i32);
        let deterministic = ply >= self.play.change_tau_ply || tau < 0.1;

        if deterministic {
            visits
                .iter()
                .max_by_key(|(_, n)| *n)
                .map(|(a, _)| *a)
                .expect("non-empty visit table")
        } else {
            let weights: Vec<f64> = visits
                .iter()
                .map(|(_, n)| (*n as f64).powf(1.0 / tau as f64))
                .collect();
            match WeightedIndex::new(&weights) {
                Ok(dist) => visits[dist.sample(&mut self.rng)].0,
                // Degenerate weights; fall back to max visits.
                Err(_) => visits
                    .iter()
                    .max_by_key(|(_, n)| *n)
                    .map(|(a, _)| *a)
                    .expect("non-empty visit table"),
            }
        }
    }
}

impl Drop for MctsPlayer {
    fn drop(&mut self) {
        self.close();
    }
}
