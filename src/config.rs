//! Configuration tree for play, data retention, evaluation and file layout.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub play: PlayConfig,
    pub play_data: PlayDataConfig,
    pub eval: EvalConfig,
    pub resource: ResourceConfig,
}

impl Config {
    /// Load a config from a JSON file, missing fields falling back to defaults.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Config> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// Knobs of the MCTS player and the game loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    /// Concurrent worker threads, one game each.
    pub max_workers: usize,
    /// Evaluator pipes per pool; must cover `max_workers`.
    pub pipe_pool_size: usize,
    /// Concurrent simulation threads inside one player.
    pub search_threads: usize,
    pub simulation_num_per_move: usize,
    pub c_puct: f32,
    /// Fraction of Dirichlet noise mixed into the root priors.
    pub noise_eps: f32,
    pub dirichlet_alpha: f32,
    /// Temperature tau decays as `tau_decay_rate ^ ply`.
    pub tau_decay_rate: f32,
    /// From this ply on the max-visit move is played deterministically.
    pub change_tau_ply: usize,
    /// Probability that resignation stays *disabled* for a self-play game.
    pub enable_resign_rate: f64,
    pub resign_threshold: f32,
    /// No resignation before this ply.
    pub min_resign_ply: usize,
    /// Root value must stay below the threshold this many own plies in a row.
    pub resign_persist_plies: usize,
    /// Maximum game length in full moves (two plies each).
    pub max_game_length: usize,
    /// Plies without a capture before the game is declared drawn.
    pub no_progress_limit: usize,
    /// Share one search tree across consecutive self-play games.
    pub share_tree: bool,
    /// When sharing, rebuild the tree empty every this many games.
    pub reset_tree_per_game: usize,
    /// Longest pause between consecutive self-play games, in seconds.
    pub max_inter_game_pause: f64,
    /// Pin worker threads to cores.
    pub cpu_pinning: bool,
}

impl Default for PlayConfig {
    fn default() -> PlayConfig {
        PlayConfig {
            max_workers: 3,
            pipe_pool_size: 3,
            search_threads: 8,
            simulation_num_per_move: 800,
            c_puct: 1.5,
            noise_eps: 0.25,
            dirichlet_alpha: 0.2,
            tau_decay_rate: 0.9,
            change_tau_ply: 30,
            enable_resign_rate: 0.5,
            resign_threshold: -0.98,
            min_resign_ply: 40,
            resign_persist_plies: 3,
            max_game_length: 100,
            no_progress_limit: 120,
            share_tree: true,
            reset_tree_per_game: 5,
            max_inter_game_pause: 1.0,
            cpu_pinning: false,
        }
    }
}

/// Training-record retention policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayDataConfig {
    /// Games per persisted batch file.
    pub nb_game_in_file: usize,
    /// Newest batch files kept on disk; older ones are pruned.
    pub max_file_num: usize,
    /// Games shorter than this many plies are only stored probabilistically.
    pub min_store_plies: usize,
    /// Storage probability for those short games.
    pub short_game_store_rate: f64,
}

impl Default for PlayDataConfig {
    fn default() -> PlayDataConfig {
        PlayDataConfig {
            nb_game_in_file: 5,
            max_file_num: 300,
            min_store_plies: 10,
            short_game_store_rate: 0.1,
        }
    }
}

/// Tournament settings for candidate-vs-best evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Games each evaluation worker plays.
    pub game_num: usize,
    /// Minimum candidate score share for promotion.
    pub replace_rate: f64,
    /// Delay between polls for a not-yet-available candidate, in seconds.
    pub candidate_poll_secs: u64,
}

impl Default for EvalConfig {
    fn default() -> EvalConfig {
        EvalConfig {
            game_num: 10,
            replace_rate: 0.55,
            candidate_poll_secs: 300,
        }
    }
}

/// Directory layout for data, records and model artifacts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub data_dir: PathBuf,
}

impl Default for ResourceConfig {
    fn default() -> ResourceConfig {
        ResourceConfig {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ResourceConfig {
    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("model")
    }

    pub fn play_data_dir(&self) -> PathBuf {
        self.data_dir.join("play_data")
    }

    /// Create every directory the pipeline writes into.
    pub fn create_directories(&self) -> io::Result<()> {
        for dir in [self.data_dir.clone(), self.model_dir(), self.play_data_dir()] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
