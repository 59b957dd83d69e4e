//! Prebuild artifact layout, resolution results and errors.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::RegisterError;
use crate::util::hash::HashError;
use crate::version::Version;

/// Completion marker at the root of an artifact directory.
pub const DONE_MARKER: &str = "prebuild.done";

/// Build function identity the artifact was built with.
pub const FUNCTION_RECORD: &str = "prebuild.fn";

/// Input file invariants the artifact was built (or last validated) with.
pub const INPUTS_RECORD: &str = "prebuild.inputs.json";

/// Appended to an output's file name for its checksum file.
pub const CHECKSUM_SUFFIX: &str = ".checksum";

/// Contents of [`DONE_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneMarker {
  /// Always "complete".
  pub status: String,
  /// Unix timestamp of completion.
  pub completed_at: u64,
}

/// How a prebuild request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
  /// The requested version was already built.
  Exact,
  /// An older build within the acceptable range, made by the same function.
  Compatible,
  /// Nothing reusable; the requested version will be built on this host.
  Build,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
  /// The version actually used; differs from the request when reusing.
  pub version: Version,
  pub output_path: PathBuf,
  pub kind: ResolutionKind,
}

/// What changed underneath an existing artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamChange {
  /// An input file's content no longer matches its recorded checksum.
  InputFile(PathBuf),
  /// The build function's identity no longer matches the stored one.
  BuildFunction,
}

impl fmt::Display for UpstreamChange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      UpstreamChange::InputFile(path) => write!(f, "input file {} changed", path.display()),
      UpstreamChange::BuildFunction => f.write_str("build function changed"),
    }
  }
}

fn display_paths(paths: &[PathBuf]) -> String {
  paths
    .iter()
    .map(|p| p.display().to_string())
    .collect::<Vec<_>>()
    .join(", ")
}

#[derive(Debug, Error)]
pub enum PrebuildError {
  /// Cached results would no longer match their inputs. Never repaired automatically.
  #[error("upstream changed for {artifact}: {reason}; bump the version or remove the artifact")]
  UpstreamChanged { artifact: PathBuf, reason: UpstreamChange },

  /// Some but not all outputs exist. Never repaired automatically.
  #[error(
    "inconsistent state in {artifact}: present [{}], missing [{}]; manual cleanup needed",
    display_paths(.present),
    display_paths(.missing)
  )]
  InconsistentState {
    artifact: PathBuf,
    present: Vec<PathBuf>,
    missing: Vec<PathBuf>,
  },

  #[error("{file} is not a declared output of {artifact}")]
  FileNotDeclared { artifact: PathBuf, file: PathBuf },

  #[error("output {path} must be a relative path inside the artifact")]
  InvalidOutput { path: PathBuf },

  #[error("building {name} {version} failed: {message}")]
  Build {
    name: String,
    version: Version,
    message: String,
  },

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed record {path}: {source}")]
  Record {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Register(#[from] RegisterError),
}

impl PrebuildError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> PrebuildError {
    let path = path.into();
    move |source| PrebuildError::Io { path, source }
  }

  pub(crate) fn record(path: &Path) -> impl FnOnce(serde_json::Error) -> PrebuildError + '_ {
    move |source| PrebuildError::Record {
      path: path.to_path_buf(),
      source,
    }
  }
}
