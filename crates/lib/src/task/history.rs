//! Persistent record of completed tasks and the invariants they ran with.
//!
//! Stored as `history.json` in the scheduler's state directory:
//!
//! ```json
//! {
//!   "version": 1,
//!   "tasks": {
//!     "prebuild:/data/prebuild/hostA/genome/0.1/index": {
//!       "invariants": { "file:/data/zip/bwa__0.7.tar.gz": "9f86d0..." },
//!       "completed_at": 1733667300
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::types::{ScheduleError, TaskError};
use super::{Invariant, TaskId};
use crate::util::fs::write_atomic;
use crate::util::hash::{hash_bytes, hash_file};

/// History file name inside the state directory.
pub const HISTORY_FILENAME: &str = "history.json";

const HISTORY_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  /// Invariant key to fingerprint at the time the task last succeeded.
  pub invariants: BTreeMap<String, String>,
  /// Unix timestamp of the last successful run.
  pub completed_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistory {
  pub version: u32,
  pub tasks: BTreeMap<TaskId, HistoryEntry>,
}

impl Default for TaskHistory {
  fn default() -> Self {
    Self {
      version: HISTORY_VERSION,
      tasks: BTreeMap::new(),
    }
  }
}

impl TaskHistory {
  pub fn path_in(state_dir: &Path) -> PathBuf {
    state_dir.join(HISTORY_FILENAME)
  }

  /// Load the history, or an empty one if the file doesn't exist.
  pub fn load(state_dir: &Path) -> Result<Self, ScheduleError> {
    let path = Self::path_in(state_dir);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
      Err(e) => return Err(ScheduleError::History(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_str(&content).map_err(|e| ScheduleError::History(format!("{}: {}", path.display(), e)))
  }

  pub fn save(&self, state_dir: &Path) -> Result<(), ScheduleError> {
    let path = Self::path_in(state_dir);
    fs::create_dir_all(state_dir).map_err(|e| ScheduleError::History(format!("{}: {}", state_dir.display(), e)))?;
    let content = serde_json::to_string_pretty(self).map_err(|e| ScheduleError::History(e.to_string()))?;
    write_atomic(&path, format!("{}\n", content).as_bytes())
      .map_err(|e| ScheduleError::History(format!("{}: {}", path.display(), e)))
  }

  pub fn get(&self, id: &TaskId) -> Option<&HistoryEntry> {
    self.tasks.get(id)
  }

  pub fn record(&mut self, id: TaskId, invariants: BTreeMap<String, String>) {
    self.tasks.insert(
      id,
      HistoryEntry {
        invariants,
        completed_at: unix_now(),
      },
    );
  }
}

/// Compute the current fingerprint of every invariant.
pub(crate) fn fingerprint(invariants: &[Invariant]) -> Result<BTreeMap<String, String>, TaskError> {
  let mut prints = BTreeMap::new();
  for invariant in invariants {
    let value = match invariant {
      Invariant::FileChecksum(path) => hash_file(path)?.0,
      Invariant::Parameters { values, .. } => {
        let encoded = serde_json::to_vec(values).map_err(|e| TaskError::Action(e.to_string()))?;
        hash_bytes(&encoded).0
      }
    };
    prints.insert(invariant.key(), value);
  }
  Ok(prints)
}

pub(crate) fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}
