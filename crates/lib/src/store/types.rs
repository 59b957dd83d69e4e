//! Store types, markers and errors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::hash::{ContentHash, HashError};
use crate::version::Version;

/// Separator between algorithm name and version in archive file names.
pub const ARCHIVE_SEPARATOR: &str = "__";

/// Archive extension used when none is configured.
pub const DEFAULT_ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Marker file written at the root of an unpacked tree once extraction finished.
pub const UNPACK_MARKER: &str = ".externa-unpacked";

/// Contents of [`UNPACK_MARKER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpackMarker {
  /// Marker format version.
  pub version: u32,
  /// Always "complete".
  pub status: String,
  /// SHA-256 of the archive the tree was extracted from.
  pub archive_hash: ContentHash,
}

impl UnpackMarker {
  pub fn complete(archive_hash: ContentHash) -> Self {
    Self {
      version: 1,
      status: "complete".to_string(),
      archive_hash,
    }
  }
}

/// Result of [`ArchiveStore::ensure_unpacked`](super::ArchiveStore::ensure_unpacked).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackOutcome {
  /// The archive was extracted by this call.
  Unpacked,
  /// A completion marker was already present; nothing was done.
  AlreadyUnpacked,
}

/// Result of [`ArchiveStore::ingest`](super::ArchiveStore::ingest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
  /// The archive was moved into the store at this path.
  Installed(PathBuf),
  /// An identical archive was already in the store at this path.
  AlreadyPresent(PathBuf),
}

impl IngestOutcome {
  pub fn path(&self) -> &PathBuf {
    match self {
      IngestOutcome::Installed(p) | IngestOutcome::AlreadyPresent(p) => p,
    }
  }
}

/// One archive file name whose copies across stores do not agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
  pub file_name: String,
  /// Each distinct content hash and the copies that have it.
  pub copies: BTreeMap<ContentHash, Vec<PathBuf>>,
}

fn join_versions(versions: &[Version]) -> String {
  if versions.is_empty() {
    return "none".to_string();
  }
  versions.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("no versions of {name} in the store")]
  NoVersions { name: String },

  #[error("version {version} of {name} not in the store (available: {})", join_versions(.available))]
  VersionNotFound {
    name: String,
    version: Version,
    available: Vec<Version>,
  },

  #[error("invalid archive identity {name}__{version}: {reason}")]
  InvalidIdentity {
    name: String,
    version: String,
    reason: &'static str,
  },

  #[error(
    "download discrepancy for {name} {version}: fetched {fetched} has sha256 {fetched_hash}, \
     but {existing} has sha256 {existing_hash}"
  )]
  DownloadDiscrepancy {
    name: String,
    version: Version,
    fetched: PathBuf,
    fetched_hash: ContentHash,
    existing: PathBuf,
    existing_hash: ContentHash,
  },

  #[error("unsupported archive format: {path}")]
  UnsupportedArchive { path: PathBuf },

  #[error("failed to extract {archive}: {message}")]
  Extract { archive: PathBuf, message: String },

  #[error("failed to fetch {url}: {source}")]
  Fetch {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("failed to parse marker {path}: {source}")]
  Marker {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("I/O error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),
}

impl StoreError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.into();
    move |source| StoreError::Io { path, source }
  }

  /// Whether this error means the requested name or version does not exist.
  pub fn is_not_found(&self) -> bool {
    matches!(self, StoreError::NoVersions { .. } | StoreError::VersionNotFound { .. })
  }
}
