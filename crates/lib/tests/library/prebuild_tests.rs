//! Prebuild resolution, reuse and drift detection across hosts.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use externa_lib::prebuild::{
  BuildFunction, DONE_MARKER, INPUTS_RECORD, PrebuildError, PrebuildJob, PrebuildManager, PrebuildRequest,
  ResolutionKind, UpstreamChange, build_fn,
};
use externa_lib::task::{LocalScheduler, ScheduleError, TaskError};
use tempfile::TempDir;

struct Fixture {
  temp: TempDir,
  builds: Arc<AtomicUsize>,
}

impl Fixture {
  fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
      builds: Arc::new(AtomicUsize::new(0)),
    }
  }

  fn manager(&self, host: &str) -> PrebuildManager {
    PrebuildManager::new(self.temp.path().join("prebuilt"), host).unwrap()
  }

  fn input(&self) -> std::path::PathBuf {
    self.temp.path().join("genome.fa")
  }

  /// A build function writing `index.bin` that counts its invocations.
  fn index_fn(&self, tag: &str) -> Arc<dyn BuildFunction> {
    let builds = self.builds.clone();
    let input = self.input();
    build_fn(tag, move |dir: &Path| {
      builds.fetch_add(1, Ordering::SeqCst);
      let data = fs::read_to_string(&input)?;
      fs::write(dir.join("index.bin"), data.to_uppercase())?;
      Ok(())
    })
  }

  fn request(&self, version: &str, tag: &str) -> PrebuildRequest {
    PrebuildRequest::new("genome_index", version, self.index_fn(tag))
      .input(self.input())
      .output("index.bin")
  }

  fn builds(&self) -> usize {
    self.builds.load(Ordering::SeqCst)
  }

  /// Register and run one request on a fresh scheduler.
  async fn run(&self, manager: &PrebuildManager, request: PrebuildRequest) -> (PrebuildJob, Result<(), ScheduleError>) {
    let state = TempDir::new().unwrap();
    let mut scheduler = LocalScheduler::new(state.path());
    let job = manager.prebuild(&mut scheduler, request).unwrap();
    let result = scheduler.run().await.map(|_| ());
    (job, result)
  }
}

fn upstream_change(result: Result<(), ScheduleError>) -> UpstreamChange {
  match result {
    Err(err) => match err.task_error() {
      Some(TaskError::Prebuild(PrebuildError::UpstreamChanged { reason, .. })) => reason.clone(),
      other => panic!("unexpected task error: {other:?}"),
    },
    Ok(()) => panic!("expected an upstream change"),
  }
}

#[tokio::test]
async fn exact_version_is_built_once() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let manager = fx.manager("hostA");

  let (job, result) = fx.run(&manager, fx.request("1.0", "v1")).await;
  result.unwrap();
  assert_eq!(job.kind(), ResolutionKind::Build);
  assert_eq!(fx.builds(), 1);
  assert_eq!(fs::read_to_string(job.find_file("index.bin").unwrap()).unwrap(), "ACGT");

  let (again, result) = fx.run(&manager, fx.request("1.0", "v1")).await;
  result.unwrap();
  assert_eq!(again.kind(), ResolutionKind::Exact);
  assert_eq!(again.output_path(), job.output_path());
  assert_eq!(fx.builds(), 1);
}

#[tokio::test]
async fn other_hosts_artifacts_are_reused_in_place() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let (built, result) = fx.run(&fx.manager("hostA"), fx.request("1.0", "v1")).await;
  result.unwrap();

  let manager_b = fx.manager("hostB");
  let (job, result) = fx.run(&manager_b, fx.request("1.0", "v1")).await;
  result.unwrap();
  assert_eq!(job.output_path(), built.output_path());
  assert!(!manager_b.host_dir().join("genome_index").exists());
  assert_eq!(fx.builds(), 1);
}

#[tokio::test]
async fn changed_input_content_is_an_upstream_change() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let manager = fx.manager("hostA");
  let (job, result) = fx.run(&manager, fx.request("1.0", "v1")).await;
  result.unwrap();

  fs::write(fx.input(), "acgtacgt").unwrap();
  let (_, result) = fx.run(&manager, fx.request("1.0", "v1")).await;
  assert_eq!(upstream_change(result), UpstreamChange::InputFile(fx.input()));
  assert_eq!(fx.builds(), 1);
  assert_eq!(fs::read_to_string(job.output_path().join("index.bin")).unwrap(), "ACGT");
}

#[tokio::test]
async fn touched_but_identical_input_is_accepted() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let manager = fx.manager("hostA");
  fx.run(&manager, fx.request("1.0", "v1")).await.1.unwrap();

  fs::write(fx.input(), "acgt").unwrap();
  fx.run(&manager, fx.request("1.0", "v1")).await.1.unwrap();
  assert_eq!(fx.builds(), 1);
}

#[tokio::test]
async fn changed_function_for_an_existing_version_is_refused() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let manager = fx.manager("hostA");
  fx.run(&manager, fx.request("1.0", "v1")).await.1.unwrap();

  let (_, result) = fx.run(&manager, fx.request("1.0", "v2")).await;
  assert_eq!(upstream_change(result), UpstreamChange::BuildFunction);
  assert_eq!(fx.builds(), 1);
}

#[tokio::test]
async fn older_compatible_version_is_reused() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  fx.run(&fx.manager("hostA"), fx.request("0.6", "v1")).await.1.unwrap();

  let manager = fx.manager("hostB");
  let request = fx.request("0.7", "v1").minimum_acceptable_version("0.4");
  let (job, result) = fx.run(&manager, request).await;
  result.unwrap();
  assert_eq!(job.kind(), ResolutionKind::Compatible);
  assert_eq!(job.version(), "0.6");
  assert_eq!(job.requested_version(), "0.7");
  assert_eq!(fx.builds(), 1);

  let request = fx.request("0.7", "v2").minimum_acceptable_version("0.4");
  let (job, result) = fx.run(&manager, request).await;
  result.unwrap();
  assert_eq!(job.kind(), ResolutionKind::Build);
  assert_eq!(job.version(), "0.7");
  assert_eq!(job.output_path(), manager.host_dir().join("genome_index/0.7"));
  assert_eq!(fx.builds(), 2);
}

#[tokio::test]
async fn maximum_acceptable_version_is_exclusive() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let manager = fx.manager("hostA");
  fx.run(&manager, fx.request("0.6", "v1")).await.1.unwrap();

  let request = fx
    .request("0.7", "v1")
    .minimum_acceptable_version("0.4")
    .maximum_acceptable_version("0.6");
  let (job, result) = fx.run(&manager, request).await;
  result.unwrap();
  assert_eq!(job.kind(), ResolutionKind::Build);
  assert_eq!(fx.builds(), 2);
}

#[tokio::test]
async fn partial_outputs_are_never_repaired() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let manager = fx.manager("hostA");
  let builds = fx.builds.clone();
  let two_outputs = build_fn("pair", move |dir: &Path| {
    builds.fetch_add(1, Ordering::SeqCst);
    fs::write(dir.join("a.bin"), "a")?;
    fs::write(dir.join("b.bin"), "b")?;
    Ok(())
  });
  let request = PrebuildRequest::new("pair", "1", two_outputs).output("a.bin").output("b.bin");

  let (job, result) = fx.run(&manager, request.clone()).await;
  result.unwrap();
  fs::remove_file(job.output_path().join("b.bin")).unwrap();

  let mut scheduler = LocalScheduler::new(fx.temp.path().join("state"));
  let err = manager.prebuild(&mut scheduler, request).unwrap_err();
  match err {
    PrebuildError::InconsistentState { missing, .. } => {
      assert_eq!(missing, vec![job.output_path().join("b.bin")]);
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(fx.builds(), 1);
  assert!(job.output_path().join(DONE_MARKER).exists());
}

#[tokio::test]
async fn undeclared_files_are_not_found() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let (job, result) = fx.run(&fx.manager("hostA"), fx.request("1.0", "v1")).await;
  result.unwrap();

  assert!(matches!(
    job.find_file("other.bin"),
    Err(PrebuildError::FileNotDeclared { .. })
  ));
  assert_eq!(job.name_file("other.bin"), job.output_path().join("other.bin"));
  assert!(job.task_id().as_str().starts_with("prebuild:"));
}

#[tokio::test]
async fn input_rewritten_during_the_build_is_an_upstream_change() {
  let fx = Fixture::new();
  fs::write(fx.input(), "ACGT").unwrap();
  let manager = fx.manager("hostA");
  let input = fx.input();
  let rewriting = build_fn("rewrite", move |dir: &Path| {
    let data = fs::read_to_string(&input)?;
    fs::write(dir.join("index.bin"), data)?;
    fs::write(&input, "TTTTTTTT")?;
    Ok(())
  });
  let request = PrebuildRequest::new("genome_index", "1.0", rewriting)
    .input(fx.input())
    .output("index.bin");

  let (job, result) = fx.run(&manager, request.clone()).await;
  result.unwrap();
  assert_eq!(fs::read_to_string(job.output_path().join("index.bin")).unwrap(), "ACGT");

  let (_, again) = fx.run(&manager, request).await;
  assert_eq!(upstream_change(again), UpstreamChange::InputFile(fx.input()));
}

#[tokio::test]
async fn same_artifact_requested_twice_is_shared() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let manager = fx.manager("hostA");
  let state = TempDir::new().unwrap();
  let mut scheduler = LocalScheduler::new(state.path());

  let first = manager.prebuild(&mut scheduler, fx.request("1.0", "v1")).unwrap();
  let second = manager.prebuild(&mut scheduler, fx.request("1.0", "v1")).unwrap();
  assert_eq!(first, second);
  assert_eq!(scheduler.len(), 1);

  let report = scheduler.run().await.unwrap();
  assert!(report.was_executed(first.task_id()));
  assert_eq!(fx.builds(), 1);
}

#[tokio::test]
async fn missing_input_record_is_written_by_the_next_check() {
  let fx = Fixture::new();
  fs::write(fx.input(), "acgt").unwrap();
  let manager = fx.manager("hostA");

  let (job, result) = fx.run(&manager, fx.request("1.0", "v1")).await;
  result.unwrap();
  let record = job.output_path().join(INPUTS_RECORD);
  fs::remove_file(&record).unwrap();

  let (_, result) = fx.run(&manager, fx.request("1.0", "v1")).await;
  result.unwrap();
  assert!(record.exists());

  fs::write(fx.input(), "acgtacgt").unwrap();
  let (_, result) = fx.run(&manager, fx.request("1.0", "v1")).await;
  assert_eq!(upstream_change(result), UpstreamChange::InputFile(fx.input()));
  assert_eq!(fx.builds(), 1);
}
