//! The local scheduler driving hand-written and prebuild tasks together.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use externa_lib::prebuild::{PrebuildManager, PrebuildRequest, build_fn};
use externa_lib::task::{CoreRequest, LocalScheduler, Scheduler, Task, TaskError, TaskId};
use tempfile::TempDir;

fn recording(id: &str, log: Arc<Mutex<Vec<String>>>) -> Task {
  let name = id.to_string();
  Task::new(id, move |_| {
    log.lock().unwrap().push(name.clone());
    Ok(())
  })
}

#[tokio::test]
async fn dependencies_run_first() {
  let temp = TempDir::new().unwrap();
  let log = Arc::new(Mutex::new(Vec::new()));
  let mut scheduler = LocalScheduler::new(temp.path()).with_parallelism(4);

  scheduler.register(recording("fetch", log.clone())).unwrap();
  scheduler
    .register(recording("index", log.clone()).depends_on([TaskId::from("fetch")]))
    .unwrap();
  scheduler
    .register(recording("align", log.clone()).depends_on([TaskId::from("index"), TaskId::from("fetch")]))
    .unwrap();

  let report = scheduler.run().await.unwrap();
  assert_eq!(report.executed.len(), 3);
  assert_eq!(*log.lock().unwrap(), ["fetch", "index", "align"]);
}

#[tokio::test]
async fn failure_stops_later_waves() {
  let temp = TempDir::new().unwrap();
  let log = Arc::new(Mutex::new(Vec::new()));
  let mut scheduler = LocalScheduler::new(temp.path());

  scheduler
    .register(Task::new("broken", |_| Err(TaskError::Action("disk full".to_string()))))
    .unwrap();
  scheduler
    .register(recording("after", log.clone()).depends_on([TaskId::from("broken")]))
    .unwrap();

  let err = scheduler.run().await.unwrap_err();
  assert!(err.to_string().contains("broken"));
  assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn multi_core_tasks_get_every_core() {
  let temp = TempDir::new().unwrap();
  let granted = Arc::new(Mutex::new(0));
  let seen = granted.clone();
  let mut scheduler = LocalScheduler::new(temp.path()).with_parallelism(3);
  scheduler
    .register(
      Task::new("wide", move |ctx| {
        *seen.lock().unwrap() = ctx.cores;
        Ok(())
      })
      .with_cores(CoreRequest::All),
    )
    .unwrap();

  scheduler.run().await.unwrap();
  assert_eq!(*granted.lock().unwrap(), 3);
}

#[tokio::test]
async fn tasks_can_depend_on_prebuilds() {
  let temp = TempDir::new().unwrap();
  let manager = PrebuildManager::new(temp.path().join("prebuilt"), "hostA").unwrap();
  let mut scheduler = LocalScheduler::new(temp.path().join("state"));

  let request = PrebuildRequest::new(
    "table",
    "1",
    build_fn("table-v1", |dir: &Path| {
      fs::write(dir.join("table.tsv"), "a\t1\n")?;
      Ok(())
    }),
  )
  .output("table.tsv");
  let job = manager.prebuild(&mut scheduler, request).unwrap();

  let table = job.find_file("table.tsv").unwrap();
  let copy = temp.path().join("copy.tsv");
  let copy_in_task = copy.clone();
  scheduler
    .register(
      Task::new("consume", move |_| {
        fs::copy(&table, &copy_in_task)?;
        Ok(())
      })
      .with_output(&copy)
      .depends_on([job.task_id().clone()]),
    )
    .unwrap();

  let report = scheduler.run().await.unwrap();
  assert!(report.was_executed(&TaskId::from("consume")));
  assert_eq!(fs::read_to_string(&copy).unwrap(), "a\t1\n");
}
