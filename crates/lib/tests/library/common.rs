//! Shared fixtures: temporary stores and archives.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use externa_lib::store::ArchiveStore;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

pub struct TestStore {
  pub temp: TempDir,
  pub store: ArchiveStore,
}

impl TestStore {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let store = ArchiveStore::init(temp.path().join("zip"), temp.path().join("unpack")).unwrap();
    Self { temp, store }
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// Publish a `.tar.gz` archive holding `files` as `name__version.tar.gz`.
  pub fn publish(&self, name: &str, version: &str, files: &[(&str, &str, u32)]) -> PathBuf {
    let path = self.store.archive_dir().join(format!("{name}__{version}.tar.gz"));
    write_tar_gz(&path, files);
    self.store.invalidate(name);
    path
  }
}

/// Write a gzipped tar of `(path, contents, mode)` entries.
pub fn write_tar_gz(path: &Path, files: &[(&str, &str, u32)]) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
  let mut builder = tar::Builder::new(encoder);
  for (name, contents, mode) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(*mode);
    header.set_cksum();
    builder.append_data(&mut header, name, contents.as_bytes()).unwrap();
  }
  builder.into_inner().unwrap().finish().unwrap();
}
