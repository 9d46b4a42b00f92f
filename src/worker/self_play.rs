//! Self-play worker: plays games against itself and stores the labeled
//! records for training.

use crate::config::Config;
use crate::evaluator::PipePool;
use crate::moves::ActionCatalogue;
use crate::records::{RecordError, RecordStore};
use crate::rules::Rules;
use crate::search::{MctsPlayer, SearchTree};
use crate::worker::game::{play_game, GameEnd, PlayedGame, Seats};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

/// Tally of one worker's run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelfPlayReport {
    pub games: usize,
    pub completed: usize,
    pub resigned: usize,
    pub drawn: usize,
    pub aborted: usize,
    pub stored: usize,
}

impl SelfPlayReport {
    pub fn merge(&mut self, other: &SelfPlayReport) {
        self.games += other.games;
        self.completed += other.completed;
        self.resigned += other.resigned;
        self.drawn += other.drawn;
        self.aborted += other.aborted;
        self.stored += other.stored;
    }
}

pub struct SelfPlayWorker {
    config: Config,
    rules: Arc<dyn Rules>,
    catalogue: Arc<ActionCatalogue>,
    store: RecordStore,
    tree: Arc<SearchTree>,
    games_on_tree: usize,
    rng: ChaCha8Rng,
}

impl SelfPlayWorker {
    pub fn new(
        config: Config,
        rules: Arc<dyn Rules>,
        catalogue: Arc<ActionCatalogue>,
        seed: u64,
    ) -> SelfPlayWorker {
        let store = RecordStore::new(
            config.resource.play_data_dir(),
            config.play_data.nb_game_in_file,
            config.play_data.max_file_num,
        );
        SelfPlayWorker {
            config,
            rules,
            catalogue,
            store,
            tree: Arc::new(SearchTree::new()),
            games_on_tree: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Play `game_num` games, storing the records that pass the retention
    /// policy. Aborted games only count, they are never stored.
    pub fn run(&mut self, pool: &PipePool, game_num: usize) -> Result<SelfPlayReport, RecordError> {
        let mut report = SelfPlayReport::default();
        for _ in 0..game_num {
            let played = self.play_one(pool);
            report.games += 1;
            match played.end {
                GameEnd::Completed => report.completed += 1,
                GameEnd::Resigned => report.resigned += 1,
                GameEnd::Drawn => report.drawn += 1,
                GameEnd::Aborted => report.aborted += 1,
            }
            if self.should_store(&played) {
                self.store.store(played.record())?;
                report.stored += 1;
            }
            self.pause();
        }
        self.store.flush()?;
        Ok(report)
    }

    fn play_one(&mut self, pool: &PipePool) -> PlayedGame {
        let tree = self.next_tree();
        // Part of the games keep resignation off so losing positions still
        // get played out and labeled.
        let enable_resign = self.rng.gen::<f64>() > self.config.play.enable_resign_rate;
        let pipe = pool.acquire();
        let player = MctsPlayer::new(
            self.config.play.clone(),
            Arc::clone(&self.rules),
            Arc::clone(&self.catalogue),
            tree,
            pipe,
            enable_resign,
            self.rng.gen(),
        );

        let mut seats = Seats::Single(player);
        let played = play_game(&self.config.play, self.rules.as_ref(), &mut seats);
        info!(
            end = ?played.end,
            plies = played.plies(),
            value_red = played.value_red,
            "self-play game finished"
        );
        played
    }

    /// Tree for the next game: a shared one reset every few games, or a
    /// fresh one per game when sharing is off.
    fn next_tree(&mut self) -> Arc<SearchTree> {
        if !self.config.play.share_tree {
            return Arc::new(SearchTree::new());
        }
        if self.games_on_tree >= self.config.play.reset_tree_per_game.max(1) {
            self.tree.clear();
            self.games_on_tree = 0;
        }
        self.games_on_tree += 1;
        Arc::clone(&self.tree)
    }

    fn should_store(&mut self, played: &PlayedGame) -> bool {
        if played.end == GameEnd::Aborted {
            return false;
        }
        played.plies() >= self.config.play_data.min_store_plies
            || self.rng.gen::<f64>() < self.config.play_data.short_game_store_rate
    }

    /// Random pause between games, spreading evaluator load across workers.
    fn pause(&mut self) {
        let max = self.config.play.max_inter_game_pause;
        if max > 0.0 {
            let secs = self.rng.gen_range(0.0..max);
            thread::sleep(Duration::from_secs_f64(secs));
        }
    }
}
