//! Wrapped tools resolved from a store and run through the local scheduler.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use externa_lib::algorithm::{Binding, CommandSpec, Externals, ExternalAlgorithm, RunOptions, ToolError};
use externa_lib::ledger::VersionLedger;
use externa_lib::store::ArchiveStore;
use externa_lib::task::{LocalScheduler, TaskError};

use super::common::TestStore;

const SCRIPT: &str = "#!/bin/sh
out=\"$1\"; shift
echo \"args: $*\" > \"$out/result.txt\"
echo ran
exit \"${FAIL:-0}\"
";

/// Runs `bin/run.sh` from the unpacked archive.
struct Script;

impl ExternalAlgorithm for Script {
  type Args = Vec<String>;

  fn name(&self) -> &str {
    "script"
  }

  fn build_cmd(
    &self,
    binding: &Binding,
    output_dir: &Path,
    _ncores: usize,
    args: &Self::Args,
  ) -> Result<CommandSpec, ToolError> {
    Ok(
      CommandSpec::new("/bin/sh")
        .arg_path(&binding.path.join("bin/run.sh"))
        .arg_path(output_dir)
        .args(args.iter().cloned()),
    )
  }
}

/// Same script, forced to fail.
struct Failing;

impl ExternalAlgorithm for Failing {
  type Args = ();

  fn name(&self) -> &str {
    "script"
  }

  fn build_cmd(&self, binding: &Binding, output_dir: &Path, _: usize, _: &()) -> Result<CommandSpec, ToolError> {
    Ok(
      CommandSpec::new("/bin/sh")
        .arg_path(&binding.path.join("bin/run.sh"))
        .arg_path(output_dir)
        .env("FAIL", "3"),
    )
  }
}

fn externals(ts: &TestStore) -> Externals {
  let store = ArchiveStore::new(ts.store.archive_dir(), ts.store.unpack_dir());
  Externals::new(store, VersionLedger::in_dir(ts.path()))
}

#[cfg(unix)]
#[tokio::test]
async fn run_writes_results_and_skips_when_up_to_date() {
  let ts = TestStore::new();
  ts.publish("script", "0.9", &[("bin/run.sh", SCRIPT, 0o755)]);
  ts.publish("script", "0.10", &[("bin/run.sh", SCRIPT, 0o755)]);
  let externals = externals(&ts);

  let handle = externals.algorithm(Script, "_latest").unwrap();
  assert_eq!(handle.version(), "0.10");

  let out = ts.path().join("results");
  let state = ts.path().join("state");
  let mut scheduler = LocalScheduler::new(&state);
  let run = handle
    .run(&mut scheduler, &out, RunOptions::new(vec!["a".to_string(), "b".to_string()]))
    .unwrap();
  assert_eq!(run.output_dir, out.join("0.10"));
  assert!(!run.sentinel().exists());

  let report = scheduler.run().await.unwrap();
  assert!(report.was_executed(&run.task_id));
  assert_eq!(fs::read_to_string(run.output_dir.join("result.txt")).unwrap(), "args: a b\n");
  assert_eq!(fs::read_to_string(run.stdout()).unwrap(), "ran\n");
  let sentinel = fs::read_to_string(run.sentinel()).unwrap();
  assert!(sentinel.starts_with("run time: "));
  assert!(sentinel.ends_with("return code: 0"));
  let argv: Vec<String> = serde_json::from_str(&fs::read_to_string(run.cmd()).unwrap()).unwrap();
  assert_eq!(argv[0], "/bin/sh");
  assert_eq!(&argv[3..], ["a", "b"]);

  let mut again = LocalScheduler::new(&state);
  let run = handle
    .run(&mut again, &out, RunOptions::new(vec!["a".to_string(), "b".to_string()]))
    .unwrap();
  let report = again.run().await.unwrap();
  assert!(report.up_to_date.contains(&run.task_id));
}

#[cfg(unix)]
#[tokio::test]
async fn changed_parameters_rerun_the_tool() {
  let ts = TestStore::new();
  ts.publish("script", "1", &[("bin/run.sh", SCRIPT, 0o755)]);
  let externals = externals(&ts);
  let handle = externals.algorithm(Script, "1").unwrap();
  let out = ts.path().join("results");
  let state = ts.path().join("state");

  for (value, expect_run) in [("1", true), ("1", false), ("2", true)] {
    let mut scheduler = LocalScheduler::new(&state);
    let options = RunOptions::new(vec![]).with_parameter("threshold", value);
    let run = handle.run(&mut scheduler, &out, options).unwrap();
    let report = scheduler.run().await.unwrap();
    assert_eq!(report.was_executed(&run.task_id), expect_run, "threshold={value}");
  }
}

#[cfg(unix)]
#[tokio::test]
async fn failed_tool_leaves_no_sentinel() {
  let ts = TestStore::new();
  ts.publish("script", "1", &[("bin/run.sh", SCRIPT, 0o755)]);
  let externals = externals(&ts);
  let handle = externals.algorithm(Failing, "_latest").unwrap();

  let mut scheduler = LocalScheduler::new(ts.path().join("state"));
  let run = handle.run(&mut scheduler, ts.path().join("results"), RunOptions::new(())).unwrap();
  let err = scheduler.run().await.unwrap_err();

  match err.task_error() {
    Some(TaskError::Tool(ToolError::Failed { reason, .. })) => assert_eq!(reason, "Return code != 0: 3"),
    other => panic!("unexpected error: {other:?}"),
  }
  assert!(!run.sentinel().exists());
  assert_eq!(fs::read_to_string(run.stdout()).unwrap(), "ran\n");
}

#[cfg(unix)]
#[tokio::test]
async fn post_processing_runs_before_the_sentinel() {
  let ts = TestStore::new();
  ts.publish("script", "1", &[("bin/run.sh", SCRIPT, 0o755)]);
  let externals = externals(&ts);
  let handle = externals.algorithm(Script, "_latest").unwrap();

  let seen = Arc::new(std::sync::Mutex::new(None));
  let seen_in_hook = seen.clone();
  let options = RunOptions::new(vec![]).with_post_process(move |dir: &Path| {
    *seen_in_hook.lock().unwrap() = Some(dir.join("sentinel.txt").exists());
    fs::write(dir.join("summary.txt"), "ok").map_err(|e| e.to_string())
  });

  let mut scheduler = LocalScheduler::new(ts.path().join("state"));
  let run = handle.run(&mut scheduler, ts.path().join("results"), options).unwrap();
  scheduler.run().await.unwrap();

  assert_eq!(*seen.lock().unwrap(), Some(false));
  assert!(run.output_dir.join("summary.txt").exists());
  assert!(run.sentinel().exists());
}

#[test]
fn last_used_sticks_until_asked_for_latest() {
  let ts = TestStore::new();
  ts.publish("script", "0.2", &[("bin/run.sh", SCRIPT, 0o755)]);
  let externals = externals(&ts);

  assert_eq!(externals.algorithm(Script, "_last_used").unwrap().version(), "0.2");
  assert_eq!(externals.ledger().get("script").unwrap().unwrap(), "0.2");

  ts.publish("script", "0.10", &[("bin/run.sh", SCRIPT, 0o755)]);
  externals.store().invalidate("script");
  assert_eq!(externals.algorithm(Script, "_last_used").unwrap().version(), "0.2");
  assert_eq!(externals.algorithm(Script, "_latest").unwrap().version(), "0.10");
  assert_eq!(externals.algorithm(Script, "_last_used").unwrap().version(), "0.10");

  // Pinning an older version does not move the ledger backwards.
  assert_eq!(externals.algorithm(Script, "0.2").unwrap().version(), "0.2");
  assert_eq!(externals.ledger().get("script").unwrap().unwrap(), "0.10");
}

#[test]
fn unknown_version_is_not_found() {
  let ts = TestStore::new();
  ts.publish("script", "1", &[("bin/run.sh", SCRIPT, 0o755)]);
  let err = externals(&ts).algorithm(Script, "7").unwrap_err();
  assert!(err.is_not_found());
}
