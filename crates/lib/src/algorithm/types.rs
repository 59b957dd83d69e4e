//! Algorithm bindings and errors.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::store::StoreError;
use crate::version::Version;

/// A resolved `(name, version)` and where it is (or will be) unpacked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
  pub name: String,
  pub version: Version,
  /// Unpack directory. Not guaranteed to exist until the tool runs.
  pub path: PathBuf,
}

/// Errors resolving an algorithm version.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Ledger(#[from] LedgerError),
}

impl ResolveError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, ResolveError::Store(e) if e.is_not_found())
  }
}

/// Errors running a wrapped tool.
#[derive(Debug, Error)]
pub enum ToolError {
  /// The tool ran but its success check rejected the result.
  #[error("{tool} failed: {reason}\ncommand: {command}")]
  Failed {
    tool: String,
    reason: String,
    command: String,
  },

  #[error("failed to start {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid arguments for {tool}: {message}")]
  InvalidArguments { tool: String, message: String },

  #[error("post-processing for {tool} failed: {message}")]
  PostProcess { tool: String, message: String },

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl ToolError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> ToolError {
    let path = path.into();
    move |source| ToolError::Io { path, source }
  }
}
