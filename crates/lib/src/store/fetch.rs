//! Bringing new archives into the store.
//!
//! Every new archive is hashed and compared against any copy of the same
//! `(name, version)` already in this store or in a peer store before it is
//! installed. Upstream sometimes replaces a release file in place; two hosts
//! that downloaded "the same" version at different times then disagree, and
//! that must fail loudly instead of silently diverging.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::types::{IngestOutcome, StoreError};
use super::{ArchiveStore, check_identity};
use crate::util::hash::{ContentHash, hash_file};
use crate::version::Version;

impl ArchiveStore {
  /// Install the archive at `source` as `(name, version)`.
  ///
  /// `source` is copied, never moved. Fails with
  /// [`StoreError::DownloadDiscrepancy`] if a copy with the same file name in
  /// this store or any peer has different content; the archive is not
  /// installed in that case.
  pub fn ingest(&self, name: &str, version: &Version, source: &Path) -> Result<IngestOutcome, StoreError> {
    check_identity(name, version)?;

    let file_name = self.archive_file_name(name, version);
    let target = self.archive_dir().join(&file_name);
    let fetched_hash = hash_file(source)?;
    debug!(name = %name, version = %version, hash = %fetched_hash, "ingesting archive");

    let discrepancy = |existing: PathBuf, existing_hash: ContentHash| StoreError::DownloadDiscrepancy {
      name: name.to_string(),
      version: version.clone(),
      fetched: source.to_path_buf(),
      fetched_hash: fetched_hash.clone(),
      existing,
      existing_hash,
    };

    let already_present = target.is_file();
    if already_present {
      let existing_hash = hash_file(&target)?;
      if existing_hash != fetched_hash {
        return Err(discrepancy(target, existing_hash));
      }
    }

    for peer_copy in self.peer_copies(&file_name) {
      let peer_hash = match hash_file(&peer_copy) {
        Ok(hash) => hash,
        Err(e) => {
          warn!(path = ?peer_copy, error = %e, "skipping unreadable peer archive");
          continue;
        }
      };
      if peer_hash != fetched_hash {
        return Err(discrepancy(peer_copy, peer_hash));
      }
    }

    if already_present {
      debug!(path = ?target, "identical archive already present");
      return Ok(IngestOutcome::AlreadyPresent(target));
    }

    fs::create_dir_all(self.archive_dir()).map_err(StoreError::io(self.archive_dir()))?;
    let mut tmp = NamedTempFile::new_in(self.archive_dir()).map_err(StoreError::io(self.archive_dir()))?;
    let mut input = File::open(source).map_err(StoreError::io(source))?;
    io::copy(&mut input, &mut tmp).map_err(StoreError::io(tmp.path()))?;
    tmp.as_file().sync_all().map_err(StoreError::io(tmp.path()))?;
    tmp.persist_noclobber(&target).map_err(|e| StoreError::io(&target)(e.error))?;

    self.invalidate(name);
    info!(name = %name, version = %version, path = ?target, "archive installed");
    Ok(IngestOutcome::Installed(target))
  }

  /// Download `url` and [`ingest`](Self::ingest) it as `(name, version)`.
  ///
  /// Blocking. The download is not retried; a transient failure surfaces as
  /// [`StoreError::Fetch`] and the caller decides whether to call again.
  pub fn fetch_url(&self, name: &str, version: &Version, url: &str) -> Result<IngestOutcome, StoreError> {
    check_identity(name, version)?;
    info!(name = %name, version = %version, url = %url, "fetching archive");

    let fetch_err = |source| StoreError::Fetch {
      url: url.to_string(),
      source,
    };

    let mut response = reqwest::blocking::get(url)
      .and_then(|r| r.error_for_status())
      .map_err(fetch_err)?;

    fs::create_dir_all(self.archive_dir()).map_err(StoreError::io(self.archive_dir()))?;
    let mut download = tempfile::Builder::new()
      .prefix(".download-")
      .tempfile_in(self.archive_dir())
      .map_err(StoreError::io(self.archive_dir()))?;
    response.copy_to(&mut download).map_err(fetch_err)?;
    download.flush().map_err(StoreError::io(download.path()))?;

    // The temporary download is removed when `download` drops.
    self.ingest(name, version, download.path())
  }

  /// Same-named archives in peer stores, excluding this store itself.
  fn peer_copies(&self, file_name: &str) -> Vec<PathBuf> {
    let own = dunce::canonicalize(self.archive_dir()).ok();
    self
      .peers()
      .iter()
      .filter(|peer| own.is_none() || dunce::canonicalize(peer).ok() != own)
      .map(|peer| peer.join(file_name))
      .filter(|candidate| candidate.is_file())
      .collect()
  }
}
