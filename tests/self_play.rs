mod common;

use common::{
    test_config, BrokenModel, CheckCycleRules, CycleRules, LadderRules, RedLosingModel,
    UniformLoader, UniformModel,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use xqzero::config::Config;
use xqzero::evaluator::{Evaluator, Model, PipePool};
use xqzero::model_store::ModelStore;
use xqzero::moves::ActionCatalogue;
use xqzero::orchestrator::{run_evaluation, run_self_play, OrchestratorError};
use xqzero::records::RecordEntry;
use xqzero::rules::Rules;
use xqzero::search::{MctsPlayer, SearchTree};
use xqzero::worker::{play_game, GameEnd, PlayedGame, Seats, SelfPlayWorker};

fn play_single(
    config: &Config,
    rules: Arc<dyn Rules>,
    model: Box<dyn Model>,
    enable_resign: bool,
) -> PlayedGame {
    let catalogue = Arc::new(ActionCatalogue::new());
    let mut evaluator = Evaluator::spawn(model);
    let pool = PipePool::new(&evaluator, 1);
    let player = MctsPlayer::new(
        config.play.clone(),
        Arc::clone(&rules),
        catalogue,
        Arc::new(SearchTree::new()),
        pool.acquire(),
        enable_resign,
        7,
    );
    let mut seats = Seats::Single(player);
    let played = play_game(&config.play, rules.as_ref(), &mut seats);
    drop(seats);
    evaluator.close();
    played
}

#[test]
fn completed_game_labels_alternate_sign_from_red() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let rules = Arc::new(LadderRules {
        win_at: 5,
        forced_finish: false,
    });

    let played = play_single(&config, rules, Box::new(UniformModel), false);

    assert_eq!(played.end, GameEnd::Completed);
    assert_eq!(played.plies(), 5);
    assert_eq!(played.value_red, 1.0);

    let labels: Vec<f32> = played
        .record()
        .entries
        .iter()
        .skip(1)
        .map(|entry| match entry {
            RecordEntry::Labeled(_, value) => *value,
            RecordEntry::Opening(state) => panic!("unexpected opening entry {state}"),
        })
        .collect();
    assert_eq!(labels, vec![1.0, -1.0, 1.0, -1.0, 1.0]);
}

#[test]
fn forced_closing_move_completes_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let rules = Arc::new(LadderRules {
        win_at: 5,
        forced_finish: true,
    });

    let played = play_single(&config, rules, Box::new(UniformModel), false);

    assert_eq!(played.end, GameEnd::Completed);
    assert_eq!(played.plies(), 5);
    assert_eq!(played.value_red, 1.0);
    assert_eq!(played.actions.last().unwrap().to_string(), "0010");
}

#[test]
fn repetition_without_chase_draws_before_the_length_cap() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let played = play_single(&config, Arc::new(CycleRules), Box::new(UniformModel), false);

    assert_eq!(played.end, GameEnd::Drawn);
    assert_eq!(played.value_red, 0.0);
    // Second free-move repeat of the opening position, well before the cap.
    assert_eq!(played.plies(), 4);
    assert!(played.plies() < 2 * config.play.max_game_length);
}

#[test]
fn checked_mover_may_repeat_into_a_chase_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let played = play_single(&config, Arc::new(CheckCycleRules), Box::new(UniformModel), false);

    // Red repeats "a" only while in check, so its chase follow-up is
    // never forbidden; the game runs on to black's free-move draw.
    assert_eq!(played.end, GameEnd::Drawn);
    assert_eq!(played.plies(), 5);
    assert_eq!(played.value_red, 0.0);
}

#[test]
fn sustained_low_root_value_resigns_the_game() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.play.min_resign_ply = 2;
    config.play.resign_persist_plies = 2;
    let rules = Arc::new(LadderRules {
        win_at: 50,
        forced_finish: false,
    });

    let played = play_single(&config, rules, Box::new(RedLosingModel), true);

    // Red's root value sits at -1 on plies 2 and 4; black's healthy
    // plies in between must not interrupt the streak.
    assert_eq!(played.end, GameEnd::Resigned);
    assert_eq!(played.plies(), 4);
    assert_eq!(played.value_red, -1.0);
}

#[test]
fn pipes_return_to_the_pool_even_when_every_game_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    config.resource.create_directories().unwrap();
    let rules: Arc<dyn Rules> = Arc::new(LadderRules {
        win_at: 5,
        forced_finish: false,
    });

    let mut evaluator = Evaluator::spawn(Box::new(BrokenModel));
    let pool = PipePool::new(&evaluator, 1);
    let mut worker =
        SelfPlayWorker::new(config.clone(), rules, Arc::new(ActionCatalogue::new()), 11);
    let report = worker.run(&pool, 3).unwrap();

    assert_eq!(report.games, 3);
    assert_eq!(report.aborted, 3);
    assert_eq!(report.stored, 0);
    assert_eq!(pool.available(), 1);
    // Aborted games leave no play data behind.
    assert_eq!(
        fs::read_dir(config.resource.play_data_dir()).unwrap().count(),
        0
    );
    evaluator.close();
}

#[test]
fn stored_records_cover_whole_games_within_the_length_cap() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    config.resource.create_directories().unwrap();
    let rules: Arc<dyn Rules> = Arc::new(LadderRules {
        win_at: 5,
        forced_finish: false,
    });

    let mut evaluator = Evaluator::spawn(Box::new(UniformModel));
    let pool = PipePool::new(&evaluator, 1);
    let mut worker =
        SelfPlayWorker::new(config.clone(), rules, Arc::new(ActionCatalogue::new()), 13);
    let report = worker.run(&pool, 2).unwrap();
    evaluator.close();

    assert_eq!(report.stored, 2);
    let files: Vec<_> = fs::read_dir(config.resource.play_data_dir())
        .unwrap()
        .collect();
    assert_eq!(files.len(), 1);

    let text = fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
    let entries: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    let openings = entries.iter().filter(|e| e.is_string()).count();
    let moves = entries.iter().filter(|e| e.is_array()).count();
    assert_eq!(openings, 2);
    assert_eq!(moves, 10);
    assert!(moves / openings <= 2 * config.play.max_game_length);
}

#[test]
fn more_workers_than_pipes_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.play.max_workers = 2;
    config.play.pipe_pool_size = 1;

    let result = run_self_play(
        &config,
        Arc::new(LadderRules {
            win_at: 5,
            forced_finish: false,
        }),
        &UniformLoader,
        1,
    );

    assert!(matches!(
        result,
        Err(OrchestratorError::PoolMisconfigured { workers: 2, pool: 1 })
    ));
}

fn eval_setup(data_dir: &Path, replace_rate: f64) -> Config {
    let mut config = test_config(data_dir);
    config.eval.replace_rate = replace_rate;
    config.resource.create_directories().unwrap();
    let store = ModelStore::open(config.resource.model_dir()).unwrap();
    for pair in [store.best(), store.candidate()] {
        fs::write(&pair.config_path, "{}").unwrap();
        fs::write(&pair.weight_path, "w").unwrap();
    }
    config
}

#[test]
fn drawn_tournament_below_threshold_discards_the_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let config = eval_setup(dir.path(), 0.55);

    let report = run_evaluation(&config, Arc::new(CycleRules), &UniformLoader).unwrap();

    assert!(!report.promoted);
    assert!((report.score.candidate_share() - 0.5).abs() < 1e-9);
    let store = ModelStore::open(config.resource.model_dir()).unwrap();
    assert!(!store.candidate_ready());
    assert!(store.best().exists());
}

#[test]
fn tournament_share_at_the_exact_threshold_promotes() {
    let dir = tempfile::tempdir().unwrap();
    let config = eval_setup(dir.path(), 0.5);

    let report = run_evaluation(&config, Arc::new(CycleRules), &UniformLoader).unwrap();

    assert!(report.promoted);
    let store = ModelStore::open(config.resource.model_dir()).unwrap();
    assert!(!store.candidate_ready());
    assert!(store.best().exists());
}
