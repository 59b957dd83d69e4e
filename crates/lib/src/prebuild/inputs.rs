//! Input file invariants of a prebuilt artifact.
//!
//! Each input is remembered as `(path, mtime, size, checksum)`. Recomputing
//! reuses the recorded checksum when mtime and size are unchanged, so large
//! inputs are only hashed after they were touched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{INPUTS_RECORD, PrebuildError};
use crate::util::fs::write_atomic;
use crate::util::hash::hash_file;

/// Observed state of one input file. All fields are `None` for a missing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFileInvariant {
  pub path: PathBuf,
  /// Modification time in nanoseconds since the unix epoch.
  pub mtime_ns: Option<u64>,
  pub size: Option<u64>,
  pub checksum: Option<String>,
}

impl InputFileInvariant {
  fn missing(path: &Path) -> Self {
    Self {
      path: path.to_path_buf(),
      mtime_ns: None,
      size: None,
      checksum: None,
    }
  }
}

/// Observe `paths`, reusing checksums from `previous` where mtime and size match.
pub fn compute_invariants(
  paths: &[PathBuf],
  previous: &[InputFileInvariant],
) -> Result<Vec<InputFileInvariant>, PrebuildError> {
  let previous: BTreeMap<&Path, &InputFileInvariant> = previous.iter().map(|inv| (inv.path.as_path(), inv)).collect();
  let mut observed = Vec::with_capacity(paths.len());

  for path in paths {
    let metadata = match fs::metadata(path) {
      Ok(m) => m,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        observed.push(InputFileInvariant::missing(path));
        continue;
      }
      Err(e) => return Err(PrebuildError::io(path)(e)),
    };

    let mtime_ns = metadata
      .modified()
      .ok()
      .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
      .map(|d| d.as_nanos() as u64);
    let size = Some(metadata.len());

    let reusable = previous
      .get(path.as_path())
      .filter(|old| old.checksum.is_some() && old.mtime_ns == mtime_ns && old.size == size);
    let checksum = match reusable {
      Some(old) => old.checksum.clone(),
      None => {
        debug!(path = %path.display(), "hashing prebuild input");
        Some(hash_file(path)?.0)
      }
    };

    observed.push(InputFileInvariant {
      path: path.clone(),
      mtime_ns,
      size,
      checksum,
    });
  }
  Ok(observed)
}

/// First input whose recorded checksum is known and differs from `current`.
///
/// Inputs without a recorded checksum never count as drift.
pub fn find_drift<'a>(recorded: &[InputFileInvariant], current: &'a [InputFileInvariant]) -> Option<&'a Path> {
  let recorded: BTreeMap<&Path, &InputFileInvariant> = recorded.iter().map(|inv| (inv.path.as_path(), inv)).collect();
  current.iter().find_map(|now| {
    let old = recorded.get(now.path.as_path())?;
    let old_checksum = old.checksum.as_ref()?;
    (now.checksum.as_ref() != Some(old_checksum)).then_some(now.path.as_path())
  })
}

pub(crate) fn load_record(artifact: &Path) -> Result<Option<Vec<InputFileInvariant>>, PrebuildError> {
  let path = artifact.join(INPUTS_RECORD);
  let content = match fs::read_to_string(&path) {
    Ok(c) => c,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(PrebuildError::io(&path)(e)),
  };
  let record = serde_json::from_str(&content).map_err(PrebuildError::record(&path))?;
  Ok(Some(record))
}

pub(crate) fn save_record(artifact: &Path, invariants: &[InputFileInvariant]) -> Result<(), PrebuildError> {
  let path = artifact.join(INPUTS_RECORD);
  let content = serde_json::to_string_pretty(invariants).map_err(PrebuildError::record(&path))?;
  write_atomic(&path, content.as_bytes()).map_err(PrebuildError::io(&path))
}
