//! Model artifact management: the best/candidate pairs and promotion.
//!
//! An evaluator model is persisted as a pair of artifacts, a config and a
//! weight blob, kept together in one generation directory. Promotion swaps
//! the whole directory so the pair can never be observed half-replaced;
//! [`ModelStore::repair`] finishes or unwinds an interrupted swap on open.

use crate::evaluator::Model;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const CONFIG_FILENAME: &str = "model.json";
pub const WEIGHT_FILENAME: &str = "model.weights";

const BEST_DIR: &str = "best";
const CANDIDATE_DIR: &str = "next_generation";
const RETIRED_DIR: &str = "best.old";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("no candidate model to promote")]
    MissingCandidate,
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifacts not found")]
    NotFound,
    #[error("model load failed: {0}")]
    Failed(String),
}

/// Turns an artifact pair into a live evaluator model. Implemented by the
/// embedding network runtime.
pub trait ModelLoader: Send + Sync {
    fn load(&self, artifacts: &ArtifactPair) -> Result<Box<dyn Model>, ModelLoadError>;
}

/// Paths of one model generation: config object plus weight blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPair {
    pub config_path: PathBuf,
    pub weight_path: PathBuf,
}

impl ArtifactPair {
    fn in_dir(dir: &Path) -> ArtifactPair {
        ArtifactPair {
            config_path: dir.join(CONFIG_FILENAME),
            weight_path: dir.join(WEIGHT_FILENAME),
        }
    }

    /// Both artifacts present.
    pub fn exists(&self) -> bool {
        self.config_path.is_file() && self.weight_path.is_file()
    }
}

/// On-disk store of the incumbent ("best") and candidate model pairs.
pub struct ModelStore {
    model_dir: PathBuf,
}

enum SwapPhase {
    BestSetAside,
    CandidateInstalled,
}

impl ModelStore {
    /// Open a store under `model_dir`, creating the layout and finishing
    /// any promotion a previous process abandoned midway.
    pub fn open(model_dir: impl Into<PathBuf>) -> Result<ModelStore, StoreError> {
        let store = ModelStore {
            model_dir: model_dir.into(),
        };
        fs::create_dir_all(store.best_dir())?;
        fs::create_dir_all(store.candidate_dir())?;
        store.repair()?;
        Ok(store)
    }

    fn best_dir(&self) -> PathBuf {
        self.model_dir.join(BEST_DIR)
    }

    fn candidate_dir(&self) -> PathBuf {
        self.model_dir.join(CANDIDATE_DIR)
    }

    fn retired_dir(&self) -> PathBuf {
        self.model_dir.join(RETIRED_DIR)
    }

    pub fn best(&self) -> ArtifactPair {
        ArtifactPair::in_dir(&self.best_dir())
    }

    pub fn candidate(&self) -> ArtifactPair {
        ArtifactPair::in_dir(&self.candidate_dir())
    }

    /// Whether a complete candidate pair is waiting for evaluation.
    pub fn candidate_ready(&self) -> bool {
        self.candidate().exists()
    }

    /// Replace the best pair with the candidate pair. Atomic at the pair
    /// level: directory renames, never per-file copies.
    pub fn promote_candidate(&self) -> Result<(), StoreError> {
        self.promote_with_hook(|_| Ok(()))
    }

    fn promote_with_hook(
        &self,
        mut hook: impl FnMut(SwapPhase) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        if !self.candidate_ready() {
            return Err(StoreError::MissingCandidate);
        }

        let best = self.best_dir();
        let retired = self.retired_dir();
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        if best.exists() {
            fs::rename(&best, &retired)?;
        }
        hook(SwapPhase::BestSetAside)?;
        fs::rename(self.candidate_dir(), &best)?;
        hook(SwapPhase::CandidateInstalled)?;
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        fs::create_dir_all(self.candidate_dir())?;
        info!(dir = %best.display(), "best model replaced by candidate");
        Ok(())
    }

    /// Delete a candidate that failed its evaluation.
    pub fn discard_candidate(&self) -> Result<(), StoreError> {
        let dir = self.candidate_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        info!("candidate model discarded");
        Ok(())
    }

    /// Finish or unwind an interrupted promotion.
    ///
    /// Once the best pair has been set aside the promotion decision is
    /// already taken, so a present candidate is installed; only when the
    /// candidate is gone too is the old best restored.
    pub fn repair(&self) -> Result<(), StoreError> {
        let best = self.best_dir();
        let retired = self.retired_dir();
        if !retired.exists() {
            return Ok(());
        }

        if best.exists() {
            // Interrupted after the swap finished; just drop the leftover.
            fs::remove_dir_all(&retired)?;
        } else if ArtifactPair::in_dir(&self.candidate_dir()).exists() {
            warn!("finishing interrupted model promotion");
            fs::rename(self.candidate_dir(), &best)?;
            fs::remove_dir_all(&retired)?;
            fs::create_dir_all(self.candidate_dir())?;
        } else {
            warn!("rolling back interrupted model promotion");
            fs::rename(&retired, &best)?;
        }
        Ok(())
    }
}
