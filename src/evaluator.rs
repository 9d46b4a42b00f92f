//! Evaluator client: the inference service thread and the pipe pool.
//!
//! The network lives behind the [`Model`] trait. One service thread owns
//! the model, drains evaluation requests from all concurrent searches into
//! batches and routes each result back through the requester's reply
//! channel. Workers talk to the service through [`EvaluatorPipe`]s drawn
//! from a bounded [`PipePool`]; a pipe is exclusively held by one game and
//! returns to the pool when its guard is dropped.

use crate::rules::State;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use std::ops::Deref;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Policy over the full action catalogue plus a scalar value, both from
/// the perspective of the side to move.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub policy: Vec<f32>,
    pub value: f32,
}

#[derive(Debug, Error)]
#[error("model evaluation failed: {0}")]
pub struct ModelError(pub String);

/// Opaque batched policy/value function.
pub trait Model: Send {
    fn evaluate(&mut self, states: &[State]) -> Result<Vec<Evaluation>, ModelError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluatorError {
    /// The backing service is gone; fatal for the current game.
    #[error("evaluator unavailable")]
    Unavailable,
}

struct EvalRequest {
    state: State,
    reply: Sender<Evaluation>,
}

enum MasterMessage {
    Close,
}

/// Inference service thread. Bundles requests from all workers into
/// batches for the model.
pub struct Evaluator {
    thread: Option<thread::JoinHandle<()>>,
    requests: Sender<EvalRequest>,
    master: Sender<MasterMessage>,
}

impl Evaluator {
    pub fn spawn(mut model: Box<dyn Model>) -> Evaluator {
        let (requests, requests_in) = unbounded::<EvalRequest>();
        let (master, master_in) = bounded::<MasterMessage>(1);

        let thread = thread::spawn(move || loop {
            if let Ok(MasterMessage::Close) = master_in.try_recv() {
                debug!("evaluator service closing");
                break;
            }

            // Wait briefly for a first request, then drain whatever else
            // is queued into the same batch.
            let first = match requests_in.recv_timeout(Duration::from_millis(50)) {
                Ok(msg) => msg,
                Err(crossbeam::channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
            };
            let batch: Vec<EvalRequest> =
                std::iter::once(first).chain(requests_in.try_iter()).collect();
            let states: Vec<State> = batch.iter().map(|r| r.state.clone()).collect();

            match model.evaluate(&states) {
                Ok(evaluations) => {
                    debug_assert_eq!(evaluations.len(), batch.len());
                    for (request, evaluation) in batch.into_iter().zip(evaluations) {
                        // Requester may have aborted its game meanwhile.
                        let _ = request.reply.send(evaluation);
                    }
                }
                Err(err) => {
                    error!(%err, batch = states.len(), "model failed, evaluator shutting down");
                    break;
                }
            }
        });

        Evaluator {
            thread: Some(thread),
            requests,
            master,
        }
    }

    /// Open a new request/response channel to this service.
    pub fn pipe(&self) -> EvaluatorPipe {
        EvaluatorPipe {
            requests: self.requests.clone(),
        }
    }

    /// Shut the service down and join its thread.
    pub fn close(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = self.master.send(MasterMessage::Close);
            handle.join().expect("could not join evaluator thread");
        }
    }
}

impl Drop for Evaluator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Bidirectional channel to the evaluator service.
#[derive(Clone)]
pub struct EvaluatorPipe {
    requests: Sender<EvalRequest>,
}

impl EvaluatorPipe {
    /// Round-trip one evaluation request.
    pub fn evaluate(&self, state: &State) -> Result<Evaluation, EvaluatorError> {
        let (reply, response) = bounded(1);
        self.requests
            .send(EvalRequest {
                state: state.clone(),
                reply,
            })
            .map_err(|_| EvaluatorError::Unavailable)?;
        response.recv().map_err(|_| EvaluatorError::Unavailable)
    }
}

/// Bounded pool of evaluator pipes, sized to the number of concurrent
/// games. Acquisition blocks until a pipe is free; the returned guard
/// gives the pipe back exactly once, on drop, including on abort paths.
pub struct PipePool {
    slots: Sender<EvaluatorPipe>,
    free: Receiver<EvaluatorPipe>,
    capacity: usize,
}

impl PipePool {
    pub fn new(evaluator: &Evaluator, size: usize) -> PipePool {
        let (slots, free) = bounded(size);
        for _ in 0..size {
            slots.send(evaluator.pipe()).expect("pool channel sized to fit");
        }
        PipePool {
            slots,
            free,
            capacity: size,
        }
    }

    /// Remove one pipe from the pool, blocking until one is available.
    pub fn acquire(&self) -> PooledPipe {
        let pipe = self
            .free
            .recv()
            .expect("pipe pool channel cannot disconnect while the pool is alive");
        PooledPipe {
            pipe: Some(pipe),
            slots: self.slots.clone(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pipes currently sitting in the pool.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

/// Exclusive hold of one pipe for the duration of a game.
pub struct PooledPipe {
    pipe: Option<EvaluatorPipe>,
    slots: Sender<EvaluatorPipe>,
}

impl Deref for PooledPipe {
    type Target = EvaluatorPipe;

    fn deref(&self) -> &EvaluatorPipe {
        self.pipe.as_ref().expect("pipe present until drop")
    }
}

impl Drop for PooledPipe {
    fn drop(&mut self) {
        if let Some(pipe) = self.pipe.take() {
            // Pool may already be gone during shutdown.
            let _ = self.slots.send(pipe);
        }
    }
}
