//! Archive store: listing, unpacking, ingest and audit.

use std::fs;

use externa_lib::Version;
use externa_lib::store::{ArchiveStore, IngestOutcome, StoreError, UNPACK_MARKER, UnpackOutcome};

use super::common::{TestStore, write_tar_gz};

#[test]
fn versions_sort_naturally_across_archives() {
  let ts = TestStore::new();
  for v in ["0.9", "0.10", "0.2", "1.0rc1", "1.0"] {
    ts.publish("aligner", v, &[("bin/run.sh", "#!/bin/sh\n", 0o755)]);
  }
  ts.publish("other", "5", &[("x", "", 0o644)]);

  let versions = ts.store.list_versions("aligner").unwrap();
  let versions: Vec<&str> = versions.iter().map(Version::as_str).collect();
  assert_eq!(versions, ["0.2", "0.9", "0.10", "1.0", "1.0rc1"]);
  assert_eq!(ts.store.latest_version("aligner").unwrap().unwrap(), "1.0rc1");
  assert_eq!(ts.store.list_names().unwrap(), ["aligner", "other"]);
}

#[test]
fn unknown_version_lists_what_exists() {
  let ts = TestStore::new();
  ts.publish("aligner", "1.0", &[("x", "", 0o644)]);

  let err = ts.store.ensure_unpacked("aligner", &Version::from("2.0")).unwrap_err();
  assert!(err.is_not_found());
  assert!(err.to_string().contains("1.0"));

  let err = ts.store.ensure_unpacked("missing", &Version::from("1")).unwrap_err();
  assert!(matches!(err, StoreError::NoVersions { .. }));
}

#[test]
fn unpack_is_idempotent() {
  let ts = TestStore::new();
  ts.publish("aligner", "1.0", &[("bin/run.sh", "#!/bin/sh\necho hi\n", 0o755)]);
  let version = Version::from("1.0");

  assert_eq!(ts.store.ensure_unpacked("aligner", &version).unwrap(), UnpackOutcome::Unpacked);
  let dir = ts.store.unpacked_path("aligner", &version);
  assert!(dir.join(UNPACK_MARKER).is_file());
  assert_eq!(fs::read_to_string(dir.join("bin/run.sh")).unwrap(), "#!/bin/sh\necho hi\n");

  // Local edits survive because a completed tree is never touched again.
  fs::write(dir.join("bin/local.txt"), "kept").unwrap();
  assert_eq!(
    ts.store.ensure_unpacked("aligner", &version).unwrap(),
    UnpackOutcome::AlreadyUnpacked
  );
  assert!(dir.join("bin/local.txt").exists());
}

#[test]
fn interrupted_unpack_is_redone_from_scratch() {
  let ts = TestStore::new();
  ts.publish("aligner", "1.0", &[("bin/run.sh", "ok", 0o755)]);
  let version = Version::from("1.0");

  let dir = ts.store.unpacked_path("aligner", &version);
  fs::create_dir_all(dir.join("bin")).unwrap();
  fs::write(dir.join("bin/run.sh"), "trunc").unwrap();
  fs::write(dir.join("leftover"), "").unwrap();
  assert!(!ts.store.is_unpacked("aligner", &version));

  assert_eq!(ts.store.ensure_unpacked("aligner", &version).unwrap(), UnpackOutcome::Unpacked);
  assert_eq!(fs::read_to_string(dir.join("bin/run.sh")).unwrap(), "ok");
  assert!(!dir.join("leftover").exists());
}

#[test]
fn ingest_installs_then_recognizes_identical_copy() {
  let ts = TestStore::new();
  let download = ts.path().join("download.tar.gz");
  write_tar_gz(&download, &[("a", "one", 0o644)]);
  let version = Version::from("2.1");

  let first = ts.store.ingest("tool", &version, &download).unwrap();
  assert!(matches!(first, IngestOutcome::Installed(_)));
  assert_eq!(first.path(), &ts.store.archive_path("tool", &version));
  assert_eq!(ts.store.list_versions("tool").unwrap(), [version.clone()]);

  let again = ts.store.ingest("tool", &version, &download).unwrap();
  assert!(matches!(again, IngestOutcome::AlreadyPresent(_)));
}

#[test]
fn ingest_against_different_local_copy_is_a_discrepancy() {
  let ts = TestStore::new();
  let existing = ts.publish("tool", "2.1", &[("a", "one", 0o644)]);
  let before = fs::read(&existing).unwrap();

  let download = ts.path().join("download.tar.gz");
  write_tar_gz(&download, &[("a", "two", 0o644)]);
  let err = ts.store.ingest("tool", &Version::from("2.1"), &download).unwrap_err();

  assert!(matches!(err, StoreError::DownloadDiscrepancy { .. }));
  assert_eq!(fs::read(&existing).unwrap(), before);
}

#[test]
fn ingest_checks_peer_stores() {
  let ts = TestStore::new();
  let peer_dir = ts.path().join("peer_zip");
  write_tar_gz(&peer_dir.join("tool__3.tar.gz"), &[("a", "peer", 0o644)]);

  let store = ArchiveStore::init(ts.path().join("zip"), ts.path().join("unpack"))
    .unwrap()
    .with_peers([peer_dir.clone()]);
  let download = ts.path().join("download.tar.gz");
  write_tar_gz(&download, &[("a", "mine", 0o644)]);

  let err = store.ingest("tool", &Version::from("3"), &download).unwrap_err();
  match err {
    StoreError::DownloadDiscrepancy { existing, .. } => assert_eq!(existing, peer_dir.join("tool__3.tar.gz")),
    other => panic!("unexpected error: {other}"),
  }
  assert!(!store.archive_path("tool", &Version::from("3")).exists());
}

#[test]
fn audit_reports_drifted_copies() {
  let ts = TestStore::new();
  ts.publish("tool", "1", &[("a", "local", 0o644)]);
  ts.publish("same", "1", &[("a", "same", 0o644)]);

  let peer_dir = ts.path().join("peer_zip");
  write_tar_gz(&peer_dir.join("tool__1.tar.gz"), &[("a", "remote", 0o644)]);
  fs::create_dir_all(&peer_dir).unwrap();
  fs::copy(
    ts.store.archive_path("same", &Version::from("1")),
    peer_dir.join("same__1.tar.gz"),
  )
  .unwrap();

  let store = ArchiveStore::new(ts.path().join("zip"), ts.path().join("unpack")).with_peers([peer_dir]);
  let report = store.audit().unwrap();
  assert_eq!(report.len(), 1);
  assert_eq!(report[0].file_name, "tool__1.tar.gz");
  assert_eq!(report[0].copies.len(), 2);
}
