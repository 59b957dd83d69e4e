//! Cross-store consistency audit.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::ArchiveStore;
use super::types::{Discrepancy, StoreError};
use crate::util::hash::hash_file;

impl ArchiveStore {
  /// Hash every archive in this store and its peers and report each file
  /// name whose copies do not all share one hash.
  ///
  /// Unreadable files are logged and skipped. Nothing is modified.
  pub fn audit(&self) -> Result<Vec<Discrepancy>, StoreError> {
    let mut roots: Vec<PathBuf> = vec![self.archive_dir().to_path_buf()];
    roots.extend(self.peers().iter().cloned());

    let mut seen = BTreeSet::new();
    let mut archives: Vec<(String, PathBuf)> = Vec::new();
    for root in &roots {
      let canonical = dunce::canonicalize(root).unwrap_or_else(|_| root.clone());
      if !seen.insert(canonical) {
        continue;
      }

      for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = match entry {
          Ok(entry) => entry,
          Err(e) => {
            warn!(root = ?root, error = %e, "skipping unreadable store entry");
            continue;
          }
        };
        if !entry.file_type().is_file() {
          continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
          continue;
        };
        if file_name.ends_with(self.extension()) && file_name.contains(super::ARCHIVE_SEPARATOR) {
          archives.push((file_name.to_string(), entry.into_path()));
        }
      }
    }

    info!(archives = archives.len(), stores = seen.len(), "auditing archives");

    let hashed: Vec<(String, PathBuf, _)> = archives
      .into_par_iter()
      .filter_map(|(file_name, path)| match hash_file(&path) {
        Ok(hash) => Some((file_name, path, hash)),
        Err(e) => {
          warn!(path = ?path, error = %e, "skipping unreadable archive");
          None
        }
      })
      .collect();

    let mut by_name: BTreeMap<String, BTreeMap<_, Vec<PathBuf>>> = BTreeMap::new();
    for (file_name, path, hash) in hashed {
      by_name.entry(file_name).or_default().entry(hash).or_default().push(path);
    }

    let discrepancies = by_name
      .into_iter()
      .filter(|(_, copies)| copies.len() > 1)
      .map(|(file_name, mut copies)| {
        for paths in copies.values_mut() {
          paths.sort();
        }
        Discrepancy { file_name, copies }
      })
      .collect();

    Ok(discrepancies)
  }
}
