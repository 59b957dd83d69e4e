//! Lazy, marker-gated unpacking of archives.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info, warn};

use super::ArchiveStore;
use super::types::{StoreError, UNPACK_MARKER, UnpackMarker, UnpackOutcome};
use crate::util::fs::write_atomic;
use crate::util::hash::hash_file;
use crate::version::Version;

impl ArchiveStore {
  /// Make sure `(name, version)` is unpacked, extracting it if needed.
  ///
  /// The completion marker is written only after extraction succeeded. A
  /// directory left without a marker (an interrupted extraction), or whose
  /// marker names a different archive hash (the archive was replaced), is
  /// wiped and extracted again.
  pub fn ensure_unpacked(&self, name: &str, version: &Version) -> Result<UnpackOutcome, StoreError> {
    self.require_version(name, version)?;

    let target = self.unpacked_path(name, version);
    let marker_path = target.join(UNPACK_MARKER);
    let archive = self.archive_path(name, version);
    let archive_hash = hash_file(&archive)?;

    match read_unpack_marker(&target) {
      Ok(Some(marker)) if marker.archive_hash == archive_hash => {
        debug!(name = %name, version = %version, "already unpacked");
        return Ok(UnpackOutcome::AlreadyUnpacked);
      }
      Ok(Some(marker)) => warn!(
        name = %name,
        version = %version,
        unpacked = %marker.archive_hash.short(12),
        archive = %archive_hash.short(12),
        "archive changed since it was unpacked"
      ),
      Ok(None) => {}
      Err(e) => warn!(path = ?marker_path, error = %e, "unreadable unpack marker"),
    }

    if target.exists() {
      warn!(path = ?target, "removing stale unpack");
      fs::remove_dir_all(&target).map_err(StoreError::io(&target))?;
    }
    fs::create_dir_all(&target).map_err(StoreError::io(&target))?;

    info!(name = %name, version = %version, archive = ?archive, "unpacking archive");
    extract_archive(&archive, &target)?;

    let marker = UnpackMarker::complete(archive_hash);
    let content = serde_json::to_string(&marker).map_err(|source| StoreError::Marker {
      path: marker_path.clone(),
      source,
    })?;
    write_atomic(&marker_path, format!("{}\n", content).as_bytes()).map_err(StoreError::io(&marker_path))?;

    Ok(UnpackOutcome::Unpacked)
  }
}

/// Read the completion marker of an unpacked tree.
///
/// Returns `None` if the marker doesn't exist.
pub fn read_unpack_marker(dir: &Path) -> Result<Option<UnpackMarker>, StoreError> {
  let marker_path = dir.join(UNPACK_MARKER);
  let content = match fs::read_to_string(&marker_path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(StoreError::io(&marker_path)(e)),
  };
  let marker = serde_json::from_str(&content).map_err(|source| StoreError::Marker {
    path: marker_path,
    source,
  })?;
  Ok(Some(marker))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
  Tar,
  TarGz,
  Zip,
}

impl ArchiveKind {
  fn detect(path: &Path) -> Option<Self> {
    let file_name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
      Some(ArchiveKind::TarGz)
    } else if file_name.ends_with(".tar") {
      Some(ArchiveKind::Tar)
    } else if file_name.ends_with(".zip") {
      Some(ArchiveKind::Zip)
    } else {
      None
    }
  }
}

/// Extract `archive` into `dest`, keeping paths as they are in the archive.
///
/// Entries that would land outside `dest` are rejected.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), StoreError> {
  let kind = ArchiveKind::detect(archive).ok_or_else(|| StoreError::UnsupportedArchive {
    path: archive.to_path_buf(),
  })?;
  fs::create_dir_all(dest).map_err(StoreError::io(dest))?;
  let file = File::open(archive).map_err(StoreError::io(archive))?;
  let reader = BufReader::new(file);

  let extract_err = |message: String| StoreError::Extract {
    archive: archive.to_path_buf(),
    message,
  };

  match kind {
    ArchiveKind::Tar => unpack_tar(Archive::new(reader), dest).map_err(|e| extract_err(e.to_string())),
    ArchiveKind::TarGz => {
      unpack_tar(Archive::new(GzDecoder::new(reader)), dest).map_err(|e| extract_err(e.to_string()))
    }
    ArchiveKind::Zip => unpack_zip(reader, dest).map_err(extract_err),
  }
}

fn unpack_tar<R: io::Read>(mut archive: Archive<R>, dest: &Path) -> io::Result<()> {
  archive.set_preserve_permissions(true);
  for entry in archive.entries()? {
    let mut entry = entry?;
    if !entry.unpack_in(dest)? {
      let path = entry.path()?.display().to_string();
      return Err(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("entry {} escapes the target directory", path),
      ));
    }
  }
  Ok(())
}

fn unpack_zip<R: io::Read + io::Seek>(reader: R, dest: &Path) -> Result<(), String> {
  let mut archive = zip::ZipArchive::new(reader).map_err(|e| format!("failed to open zip: {}", e))?;

  for i in 0..archive.len() {
    let mut file = archive
      .by_index(i)
      .map_err(|e| format!("failed to read zip entry: {}", e))?;

    let relative = file
      .enclosed_name()
      .ok_or_else(|| format!("entry {} escapes the target directory", file.name()))?;
    let dest_path = dest.join(relative);

    if file.is_dir() {
      fs::create_dir_all(&dest_path).map_err(|e| e.to_string())?;
      continue;
    }

    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let mut outfile = File::create(&dest_path).map_err(|e| e.to_string())?;
    io::copy(&mut file, &mut outfile).map_err(|e| e.to_string())?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      if let Some(mode) = file.unix_mode() {
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode)).map_err(|e| e.to_string())?;
      }
    }
  }

  Ok(())
}
