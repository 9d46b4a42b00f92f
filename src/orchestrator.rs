//! Pipeline runners: wire models, evaluator services, pipe pools and
//! worker threads together for a self-play or evaluation run.

use crate::config::Config;
use crate::evaluator::{Evaluator, PipePool};
use crate::model_store::{ModelLoadError, ModelLoader, ModelStore, StoreError};
use crate::moves::ActionCatalogue;
use crate::records::RecordError;
use crate::rules::Rules;
use crate::worker::{EvalScore, EvaluateWorker, SelfPlayReport, SelfPlayWorker};
use rand::prelude::*;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// More workers than pipes would deadlock the pool under load; refuse
    /// to start instead.
    #[error("pipe pool of {pool} cannot serve {workers} workers")]
    PoolMisconfigured { workers: usize, pool: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Model(#[from] ModelLoadError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Outcome of one evaluation round.
#[derive(Clone, Copy, Debug)]
pub struct EvaluationReport {
    pub score: EvalScore,
    pub promoted: bool,
}

fn ensure_pool_fits(workers: usize, pool: usize) -> Result<(), OrchestratorError> {
    if workers > pool {
        return Err(OrchestratorError::PoolMisconfigured { workers, pool });
    }
    Ok(())
}

/// Split `total` games across `workers`, earlier workers taking the
/// remainder.
fn share(total: usize, workers: usize, index: usize) -> usize {
    total / workers + usize::from(index < total % workers)
}

fn pin_core(cores: Option<&Vec<core_affinity::CoreId>>, index: usize) {
    if let Some(cores) = cores {
        if let Some(&core) = cores.get(index % cores.len()) {
            core_affinity::set_for_current(core);
        }
    }
}

/// Run `game_num` self-play games with the current best model, spread
/// over the configured number of worker threads.
pub fn run_self_play(
    config: &Config,
    rules: Arc<dyn Rules>,
    loader: &dyn ModelLoader,
    game_num: usize,
) -> Result<SelfPlayReport, OrchestratorError> {
    let workers = config.play.max_workers.max(1);
    let pool_size = config.play.pipe_pool_size.max(1);
    ensure_pool_fits(workers, pool_size)?;

    config.resource.create_directories()?;
    let store = ModelStore::open(config.resource.model_dir())?;
    let model = loader.load(&store.best())?;
    let catalogue = Arc::new(ActionCatalogue::new());

    let mut evaluator = Evaluator::spawn(model);
    let pool = PipePool::new(&evaluator, pool_size);

    let cores = config.play.cpu_pinning.then(core_affinity::get_core_ids).flatten();
    let mut seeder = rand::thread_rng();
    info!(workers, game_num, "self-play run starting");

    let results: Vec<thread::Result<Result<SelfPlayReport, RecordError>>> =
        crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|index| {
                    let games = share(game_num, workers, index);
                    let config = Config::clone(config);
                    let rules = Arc::clone(&rules);
                    let catalogue = Arc::clone(&catalogue);
                    let pool = &pool;
                    let cores = cores.as_ref();
                    let seed: u64 = seeder.gen();
                    scope.spawn(move |_| {
                        pin_core(cores, index);
                        SelfPlayWorker::new(config, rules, catalogue, seed).run(pool, games)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join()).collect()
        })
        .expect("could not join self-play workers");

    let mut report = SelfPlayReport::default();
    for result in results {
        let worker_report = result.map_err(|_| OrchestratorError::WorkerPanicked)??;
        report.merge(&worker_report);
    }

    evaluator.close();
    info!(
        games = report.games,
        stored = report.stored,
        aborted = report.aborted,
        "self-play run finished"
    );
    Ok(report)
}

/// Wait for a candidate model, play the tournament against the best
/// model and promote or discard the candidate by its score share.
pub fn run_evaluation(
    config: &Config,
    rules: Arc<dyn Rules>,
    loader: &dyn ModelLoader,
) -> Result<EvaluationReport, OrchestratorError> {
    let workers = config.play.max_workers.max(1);
    let pool_size = config.play.pipe_pool_size.max(1);
    ensure_pool_fits(workers, pool_size)?;

    config.resource.create_directories()?;
    let store = ModelStore::open(config.resource.model_dir())?;
    wait_for_candidate(&store, Duration::from_secs(config.eval.candidate_poll_secs));

    let best_model = loader.load(&store.best())?;
    let candidate_model = loader.load(&store.candidate())?;
    let catalogue = Arc::new(ActionCatalogue::new());

    let mut best_evaluator = Evaluator::spawn(best_model);
    let mut candidate_evaluator = Evaluator::spawn(candidate_model);
    let best_pool = PipePool::new(&best_evaluator, pool_size);
    let candidate_pool = PipePool::new(&candidate_evaluator, pool_size);

    let cores = config.play.cpu_pinning.then(core_affinity::get_core_ids).flatten();
    let mut seeder = rand::thread_rng();
    info!(workers, games_per_worker = config.eval.game_num, "evaluation run starting");

    let results: Vec<thread::Result<EvalScore>> = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|index| {
                let config = Config::clone(config);
                let rules = Arc::clone(&rules);
                let catalogue = Arc::clone(&catalogue);
                let best_pool = &best_pool;
                let candidate_pool = &candidate_pool;
                let cores = cores.as_ref();
                let seed: u64 = seeder.gen();
                scope.spawn(move |_| {
                    pin_core(cores, index);
                    EvaluateWorker::new(config, rules, catalogue, seed)
                        .run(best_pool, candidate_pool)
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join()).collect()
    })
    .expect("could not join evaluation workers");

    let mut score = EvalScore::default();
    for result in results {
        score.merge(&result.map_err(|_| OrchestratorError::WorkerPanicked)?);
    }

    best_evaluator.close();
    candidate_evaluator.close();

    let promoted = score.candidate_share() >= config.eval.replace_rate;
    info!(
        candidate = score.candidate,
        best = score.best,
        share = score.candidate_share(),
        promoted,
        "evaluation run finished"
    );
    if promoted {
        store.promote_candidate()?;
    } else {
        store.discard_candidate()?;
    }

    Ok(EvaluationReport { score, promoted })
}

fn wait_for_candidate(store: &ModelStore, poll: Duration) {
    while !store.candidate_ready() {
        warn!(poll_secs = poll.as_secs(), "no candidate model yet, waiting");
        thread::sleep(poll);
    }
}
