//! On-disk bookkeeping inside one artifact directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::function::FunctionIdentity;
use super::types::{CHECKSUM_SUFFIX, DONE_MARKER, DoneMarker, FUNCTION_RECORD, PrebuildError};
use crate::util::fs::write_atomic;
use crate::util::hash::hash_file;

pub(crate) fn is_complete(artifact: &Path) -> bool {
  artifact.join(DONE_MARKER).is_file()
}

pub(crate) fn read_marker(artifact: &Path) -> Result<Option<DoneMarker>, PrebuildError> {
  let path = artifact.join(DONE_MARKER);
  let content = match fs::read_to_string(&path) {
    Ok(c) => c,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(PrebuildError::io(&path)(e)),
  };
  let marker = serde_json::from_str(&content).map_err(PrebuildError::record(&path))?;
  Ok(Some(marker))
}

pub(crate) fn write_marker(artifact: &Path) -> Result<(), PrebuildError> {
  let path = artifact.join(DONE_MARKER);
  let completed_at = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0);
  let marker = DoneMarker {
    status: "complete".to_string(),
    completed_at,
  };
  let content = serde_json::to_string_pretty(&marker).map_err(PrebuildError::record(&path))?;
  write_atomic(&path, content.as_bytes()).map_err(PrebuildError::io(&path))
}

/// Stored build function identity. A missing record reads as `None`.
pub(crate) fn read_function(artifact: &Path) -> Result<Option<FunctionIdentity>, PrebuildError> {
  let path = artifact.join(FUNCTION_RECORD);
  match fs::read_to_string(&path) {
    Ok(c) => Ok(Some(FunctionIdentity::from_stored(&c))),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(PrebuildError::io(&path)(e)),
  }
}

pub(crate) fn write_function(artifact: &Path, identity: &FunctionIdentity) -> Result<(), PrebuildError> {
  let path = artifact.join(FUNCTION_RECORD);
  write_atomic(&path, identity.as_str().as_bytes()).map_err(PrebuildError::io(&path))
}

/// Write `{output}.checksum` next to each output.
pub(crate) fn write_checksums(outputs: &[PathBuf]) -> Result<(), PrebuildError> {
  for output in outputs {
    let hash = hash_file(output)?;
    let mut name = output.as_os_str().to_owned();
    name.push(CHECKSUM_SUFFIX);
    let path = PathBuf::from(name);
    fs::write(&path, hash.as_str()).map_err(PrebuildError::io(&path))?;
  }
  Ok(())
}

/// Fail unless all or none of `expected` exist.
pub(crate) fn check_consistent(artifact: &Path, expected: &[PathBuf]) -> Result<(), PrebuildError> {
  let (present, missing): (Vec<PathBuf>, Vec<PathBuf>) = expected.iter().cloned().partition(|p| p.exists());
  if !present.is_empty() && !missing.is_empty() {
    return Err(PrebuildError::InconsistentState {
      artifact: artifact.to_path_buf(),
      present,
      missing,
    });
  }
  Ok(())
}
