//! Test fixtures for externa-lib.
//!
//! Archives are generated on the fly so the tests need no checked-in binaries.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

/// Build a tar stream with the given `(path, contents)` entries.
pub fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
  let mut builder = tar::Builder::new(Vec::new());
  for (path, contents) in entries {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, path, *contents).unwrap();
  }
  builder.into_inner().unwrap()
}

/// Write a gzip-compressed tarball to `path`.
pub fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
  let file = File::create(path).unwrap();
  let mut encoder = GzEncoder::new(file, Compression::fast());
  encoder.write_all(&tar_bytes(entries)).unwrap();
  encoder.finish().unwrap();
  path.to_path_buf()
}

/// Write an uncompressed tarball to `path`.
pub fn write_tar(path: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
  std::fs::write(path, tar_bytes(entries)).unwrap();
  path.to_path_buf()
}

/// Write a zip archive to `path`.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
  let file = File::create(path).unwrap();
  let mut writer = zip::ZipWriter::new(file);
  let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
  for (name, contents) in entries {
    writer.start_file(*name, options).unwrap();
    writer.write_all(contents).unwrap();
  }
  writer.finish().unwrap();
  path.to_path_buf()
}
