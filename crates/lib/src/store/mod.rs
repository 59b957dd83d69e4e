//! The external algorithm archive store.
//!
//! Archives live flat in one directory, named `{name}__{version}{ext}`.
//! Unpacked trees live at `{unpack_dir}/{name}/{version}/` and are only
//! trusted once their completion marker ([`UNPACK_MARKER`]) exists.
//!
//! Other hosts' archive directories can be registered as peers. They are only
//! read: to detect drift when a new archive is ingested, and by [`ArchiveStore::audit`].

mod audit;
mod fetch;
mod types;
mod unpack;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::version::{Version, sort_versions};

pub use types::{
  ARCHIVE_SEPARATOR, DEFAULT_ARCHIVE_EXTENSION, Discrepancy, IngestOutcome, StoreError, UNPACK_MARKER, UnpackMarker,
  UnpackOutcome,
};
pub use unpack::{extract_archive, read_unpack_marker};

#[derive(Debug)]
pub struct ArchiveStore {
  archive_dir: PathBuf,
  unpack_dir: PathBuf,
  extension: String,
  peers: Vec<PathBuf>,
  version_cache: Mutex<HashMap<String, Vec<Version>>>,
}

impl ArchiveStore {
  /// Create a store handle. No I/O is performed.
  pub fn new(archive_dir: impl Into<PathBuf>, unpack_dir: impl Into<PathBuf>) -> Self {
    Self {
      archive_dir: archive_dir.into(),
      unpack_dir: unpack_dir.into(),
      extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
      peers: Vec::new(),
      version_cache: Mutex::new(HashMap::new()),
    }
  }

  /// Create a store handle and make sure both directories exist.
  pub fn init(archive_dir: impl Into<PathBuf>, unpack_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let store = Self::new(archive_dir, unpack_dir);
    fs::create_dir_all(&store.archive_dir).map_err(StoreError::io(&store.archive_dir))?;
    fs::create_dir_all(&store.unpack_dir).map_err(StoreError::io(&store.unpack_dir))?;
    Ok(store)
  }

  /// Use a different archive extension (including the leading dot).
  pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
    self.extension = extension.into();
    self
  }

  /// Register other hosts' archive directories for drift detection.
  pub fn with_peers(mut self, peers: impl IntoIterator<Item = PathBuf>) -> Self {
    self.peers = peers.into_iter().collect();
    self
  }

  pub fn archive_dir(&self) -> &Path {
    &self.archive_dir
  }

  pub fn unpack_dir(&self) -> &Path {
    &self.unpack_dir
  }

  pub fn extension(&self) -> &str {
    &self.extension
  }

  pub fn peers(&self) -> &[PathBuf] {
    &self.peers
  }

  pub fn archive_file_name(&self, name: &str, version: &Version) -> String {
    format!("{}{}{}{}", name, ARCHIVE_SEPARATOR, version, self.extension)
  }

  /// Where the archive for `(name, version)` lives. Existence is not checked.
  pub fn archive_path(&self, name: &str, version: &Version) -> PathBuf {
    self.archive_dir.join(self.archive_file_name(name, version))
  }

  /// Where `(name, version)` is unpacked to. Existence is not checked.
  pub fn unpacked_path(&self, name: &str, version: &Version) -> PathBuf {
    self.unpack_dir.join(name).join(version.as_str())
  }

  /// Whether the unpacked tree for `(name, version)` carries its completion marker.
  ///
  /// Does not hash the archive; [`ensure_unpacked`](Self::ensure_unpacked) does.
  pub fn is_unpacked(&self, name: &str, version: &Version) -> bool {
    self.unpacked_path(name, version).join(UNPACK_MARKER).exists()
  }

  /// All versions of `name` present in the store, ascending.
  ///
  /// Results are cached per name. An empty result is never served from the
  /// cache, so archives appearing later are picked up.
  pub fn list_versions(&self, name: &str) -> Result<Vec<Version>, StoreError> {
    {
      let cache = self.version_cache.lock().unwrap_or_else(PoisonError::into_inner);
      if let Some(versions) = cache.get(name)
        && !versions.is_empty()
      {
        return Ok(versions.clone());
      }
    }

    let versions = self.scan_versions(name)?;
    debug!(name = %name, count = versions.len(), "scanned store for versions");

    let mut cache = self.version_cache.lock().unwrap_or_else(PoisonError::into_inner);
    cache.insert(name.to_string(), versions.clone());
    Ok(versions)
  }

  /// The highest version of `name`, if any.
  pub fn latest_version(&self, name: &str) -> Result<Option<Version>, StoreError> {
    Ok(self.list_versions(name)?.pop())
  }

  /// Fail with a not-found error unless `version` of `name` is in the store.
  pub fn require_version(&self, name: &str, version: &Version) -> Result<(), StoreError> {
    let available = self.list_versions(name)?;
    if available.is_empty() {
      return Err(StoreError::NoVersions { name: name.to_string() });
    }
    if available.contains(version) {
      return Ok(());
    }
    Err(StoreError::VersionNotFound {
      name: name.to_string(),
      version: version.clone(),
      available,
    })
  }

  /// Every algorithm name with at least one archive, sorted.
  pub fn list_names(&self) -> Result<Vec<String>, StoreError> {
    let mut names: Vec<String> = self
      .archive_file_names()?
      .iter()
      .filter_map(|file_name| self.split_file_name(file_name))
      .map(|(name, _)| name.to_string())
      .collect();
    names.sort();
    names.dedup();
    Ok(names)
  }

  /// Forget cached versions of `name`.
  pub fn invalidate(&self, name: &str) {
    let mut cache = self.version_cache.lock().unwrap_or_else(PoisonError::into_inner);
    cache.remove(name);
  }

  fn scan_versions(&self, name: &str) -> Result<Vec<Version>, StoreError> {
    let prefix = format!("{}{}", name, ARCHIVE_SEPARATOR);
    let mut versions: Vec<Version> = self
      .archive_file_names()?
      .iter()
      .filter_map(|file_name| {
        let version = file_name.strip_prefix(&prefix)?.strip_suffix(self.extension.as_str())?;
        valid_version(version).then(|| Version::new(version))
      })
      .collect();
    sort_versions(&mut versions);
    Ok(versions)
  }

  fn split_file_name<'a>(&self, file_name: &'a str) -> Option<(&'a str, &'a str)> {
    let stem = file_name.strip_suffix(self.extension.as_str())?;
    let (name, version) = stem.split_once(ARCHIVE_SEPARATOR)?;
    (!name.is_empty() && valid_version(version)).then_some((name, version))
  }

  fn archive_file_names(&self) -> Result<Vec<String>, StoreError> {
    let entries = match fs::read_dir(&self.archive_dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(StoreError::io(&self.archive_dir)(e)),
    };

    let mut names = Vec::new();
    for entry in entries {
      let entry = entry.map_err(StoreError::io(&self.archive_dir))?;
      if !entry.path().is_file() {
        continue;
      }
      if let Some(file_name) = entry.file_name().to_str() {
        names.push(file_name.to_string());
      }
    }
    Ok(names)
  }
}

fn valid_version(version: &str) -> bool {
  !version.is_empty() && !version.contains(ARCHIVE_SEPARATOR)
}

/// Check that `(name, version)` can form an archive file name.
pub(crate) fn check_identity(name: &str, version: &Version) -> Result<(), StoreError> {
  let invalid = |reason| StoreError::InvalidIdentity {
    name: name.to_string(),
    version: version.to_string(),
    reason,
  };

  if name.is_empty() || name.contains(ARCHIVE_SEPARATOR) {
    return Err(invalid("name must be non-empty and must not contain '__'"));
  }
  if !valid_version(version.as_str()) {
    return Err(invalid("version must be non-empty and must not contain '__'"));
  }
  let has_separator = |s: &str| s.contains(['/', '\\']) || s == "." || s == "..";
  if has_separator(name) || has_separator(version.as_str()) {
    return Err(invalid("path separators are not allowed"));
  }
  Ok(())
}
