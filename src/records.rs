//! Labeled game records and their on-disk batch files.
//!
//! A record is an ordered list whose first element is the initial state
//! and every following element a `[move, value]` pair, the value oriented
//! to the side that made the move. Records are buffered and written as one
//! JSON file per configured number of games, named by a UTC+8 timestamp;
//! old batches are pruned oldest-first.

use crate::moves::Action;
use crate::rules::State;
use chrono::{FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("record serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// One element of a persisted record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordEntry {
    /// The initial state, first element only.
    Opening(String),
    /// A move and the final outcome from the mover's perspective.
    Labeled(String, f32),
}

/// Ordered label sequence of one finished game. Append-only while the
/// game runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameRecord {
    pub entries: Vec<RecordEntry>,
}

impl GameRecord {
    pub fn new(initial: &State) -> GameRecord {
        GameRecord {
            entries: vec![RecordEntry::Opening(initial.as_str().to_string())],
        }
    }

    pub fn push(&mut self, action: Action, value: f32) {
        self.entries
            .push(RecordEntry::Labeled(action.to_string(), value));
    }

    /// Plies covered by this record.
    pub fn plies(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }
}

/// Buffered batch writer for game records.
pub struct RecordStore {
    dir: PathBuf,
    nb_game_in_file: usize,
    max_file_num: usize,
    buffer: Vec<RecordEntry>,
    games: usize,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>, nb_game_in_file: usize, max_file_num: usize) -> RecordStore {
        RecordStore {
            dir: dir.into(),
            nb_game_in_file: nb_game_in_file.max(1),
            max_file_num,
            buffer: Vec::new(),
            games: 0,
        }
    }

    /// Buffer one record, flushing a batch file when enough games have
    /// accumulated, then prune old batches.
    pub fn store(&mut self, record: GameRecord) -> Result<(), RecordError> {
        self.buffer.extend(record.entries);
        self.games += 1;
        if self.games % self.nb_game_in_file == 0 {
            self.flush()?;
        }
        self.prune();
        Ok(())
    }

    /// Write the buffered entries out now.
    pub fn flush(&mut self) -> Result<(), RecordError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let path = self.dir.join(format!("play_{}.json", timestamp()));
        let text = serde_json::to_string(&self.buffer)?;
        fs::write(&path, text)?;
        info!(path = %path.display(), entries = self.buffer.len(), "saved play data");
        self.buffer.clear();
        Ok(())
    }

    /// Batch files in this store's directory, oldest first.
    pub fn batch_files(&self) -> Vec<PathBuf> {
        batch_files(&self.dir)
    }

    /// Remove the oldest batches beyond the retention count. Best effort;
    /// a concurrent trainer may already have consumed a file.
    fn prune(&self) {
        let files = self.batch_files();
        if files.len() <= self.max_file_num {
            return;
        }
        for path in &files[..files.len() - self.max_file_num] {
            if let Err(err) = fs::remove_file(path) {
                warn!(path = %path.display(), %err, "could not prune play data file");
            }
        }
    }
}

/// Timestamped batch filenames sort chronologically.
fn batch_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("play_") && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

fn timestamp() -> String {
    let utc8 = FixedOffset::east_opt(8 * 3600).expect("fixed UTC+8 offset");
    Utc::now()
        .with_timezone(&utc8)
        .format("%Y%m%d-%H%M%S.%6f")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(s: &str) -> Action {
        s.parse().unwrap()
    }

    #[test]
    fn record_serializes_as_state_then_move_value_pairs() {
        let mut record = GameRecord::new(&State::new("init"));
        record.push(act("0010"), 1.0);
        record.push(act("0908"), -1.0);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"["init",["0010",1.0],["0908",-1.0]]"#);

        let back: GameRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.plies(), 2);
    }

    #[test]
    fn store_flushes_every_nb_game_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::new(dir.path(), 2, 10);

        store.store(GameRecord::new(&State::new("a"))).unwrap();
        assert_eq!(store.batch_files().len(), 0);
        store.store(GameRecord::new(&State::new("b"))).unwrap();
        assert_eq!(store.batch_files().len(), 1);
    }

    #[test]
    fn prune_removes_oldest_batches_first() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            // Distinct sortable names, oldest first.
            fs::write(dir.path().join(format!("play_000{i}.json")), "[]").unwrap();
        }
        let mut store = RecordStore::new(dir.path(), 1, 3);
        store.store(GameRecord::new(&State::new("x"))).unwrap();

        let files = store.batch_files();
        assert_eq!(files.len(), 3);
        assert!(files
            .iter()
            .all(|f| !f.ends_with("play_0000.json")));
    }
}
