//! In-process scheduler running tasks in dependency waves.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::dag::TaskGraph;
use super::history::{HistoryEntry, TaskHistory, fingerprint};
use super::types::{RegisterError, RunReport, ScheduleError, TaskError};
use super::{CoreRequest, Scheduler, Task, TaskContext, TaskId};

/// Runs registered tasks on the tokio blocking pool.
///
/// A task runs when any declared output is missing, it has no history entry,
/// an invariant's fingerprint changed, or one of its dependencies ran during
/// the same [`run`](Self::run). Its validation hook is checked first in every
/// case. Execution stops after the first wave containing a failure.
pub struct LocalScheduler {
  state_dir: PathBuf,
  parallelism: usize,
  tasks: Vec<Task>,
  index: HashMap<TaskId, usize>,
}

impl LocalScheduler {
  /// A scheduler keeping its history in `state_dir`, using all available cores.
  pub fn new(state_dir: impl Into<PathBuf>) -> Self {
    let parallelism = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    Self {
      state_dir: state_dir.into(),
      parallelism,
      tasks: Vec::new(),
      index: HashMap::new(),
    }
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  pub fn parallelism(&self) -> usize {
    self.parallelism
  }

  pub fn state_dir(&self) -> &Path {
    &self.state_dir
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  pub fn task(&self, id: &TaskId) -> Option<&Task> {
    self.index.get(id).map(|&i| &self.tasks[i])
  }

  /// Run every registered task whose results are not up to date.
  pub async fn run(&self) -> Result<RunReport, ScheduleError> {
    let graph = TaskGraph::from_tasks(&self.tasks)?;
    let waves = graph.waves()?;
    info!(tasks = self.tasks.len(), wave_count = waves.len(), "running tasks");

    let mut history = TaskHistory::load(&self.state_dir)?;
    let mut report = RunReport::default();
    let mut ran: HashSet<TaskId> = HashSet::new();
    let semaphore = Arc::new(Semaphore::new(self.parallelism));

    for (wave_idx, wave) in waves.iter().enumerate() {
      debug!(wave = wave_idx, tasks = wave.len(), "executing wave");

      let mut join_set = JoinSet::new();
      for id in wave {
        let Some(task) = self.task(id).cloned() else {
          continue;
        };
        let upstream_ran = task.dependencies.iter().any(|dep| ran.contains(dep));
        let previous = history.get(id).cloned();
        let permits = match task.cores {
          CoreRequest::One => 1,
          CoreRequest::All => self.parallelism,
        };
        let semaphore = semaphore.clone();

        join_set.spawn(async move {
          let _permit = semaphore
            .acquire_many_owned(permits as u32)
            .await
            .map_err(|e| ScheduleError::Join(e.to_string()))?;
          let id = task.id.clone();
          let outcome = tokio::task::spawn_blocking(move || run_task(&task, permits, upstream_ran, previous.as_ref()))
            .await
            .map_err(|e| ScheduleError::Join(e.to_string()))?;
          Ok::<_, ScheduleError>((id, outcome))
        });
      }

      let mut failures: Vec<(TaskId, TaskError)> = Vec::new();
      let mut worker_error: Option<ScheduleError> = None;
      while let Some(joined) = join_set.join_next().await {
        let (id, outcome) = match joined {
          Ok(Ok(result)) => result,
          Ok(Err(e)) => {
            error!(error = %e, "task worker failed");
            worker_error.get_or_insert(e);
            continue;
          }
          Err(e) => {
            error!(error = %e, "task worker panicked");
            worker_error.get_or_insert(ScheduleError::Join(e.to_string()));
            continue;
          }
        };

        match outcome {
          Ok(TaskOutcome::Executed(prints)) => {
            info!(task = %id, "task completed");
            history.record(id.clone(), prints);
            ran.insert(id.clone());
            report.executed.push(id);
          }
          Ok(TaskOutcome::UpToDate) => {
            debug!(task = %id, "task up to date");
            report.up_to_date.push(id);
          }
          Err(e) => {
            error!(task = %id, error = %e, "task failed");
            failures.push((id, e));
          }
        }
      }

      history.save(&self.state_dir)?;

      if let Some(e) = worker_error {
        return Err(e);
      }
      if !failures.is_empty() {
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        let (id, source) = failures.remove(0);
        return Err(ScheduleError::TaskFailed { id, source });
      }
    }

    Ok(report)
  }
}

impl Scheduler for LocalScheduler {
  fn register(&mut self, task: Task) -> Result<TaskId, RegisterError> {
    if self.index.contains_key(&task.id) {
      return Err(RegisterError::DuplicateTask(task.id));
    }
    if let Some(missing) = task.dependencies.iter().find(|dep| !self.index.contains_key(*dep)) {
      return Err(RegisterError::UnknownDependency {
        task: task.id.clone(),
        dependency: missing.clone(),
      });
    }

    let id = task.id.clone();
    debug!(task = %id, outputs = task.outputs.len(), "registered task");
    self.index.insert(id.clone(), self.tasks.len());
    self.tasks.push(task);
    Ok(id)
  }

  fn is_registered(&self, id: &TaskId) -> bool {
    self.index.contains_key(id)
  }
}

enum TaskOutcome {
  Executed(BTreeMap<String, String>),
  UpToDate,
}

fn run_task(
  task: &Task,
  cores: usize,
  upstream_ran: bool,
  previous: Option<&HistoryEntry>,
) -> Result<TaskOutcome, TaskError> {
  if let Some(validate) = &task.validation {
    validate()?;
  }

  let missing_output = task.outputs.iter().find(|p| !p.exists());
  let prints = fingerprint(&task.invariants)?;

  let reason = if let Some(path) = missing_output {
    Some(format!("output {} missing", path.display()))
  } else if upstream_ran {
    Some("dependency ran".to_string())
  } else {
    match previous {
      None => Some("no previous run".to_string()),
      Some(entry) if entry.invariants != prints => Some("invariants changed".to_string()),
      Some(_) => None,
    }
  };

  let Some(reason) = reason else {
    return Ok(TaskOutcome::UpToDate);
  };

  debug!(task = %task.id, reason = %reason, "running task");
  let context = TaskContext {
    id: task.id.clone(),
    cores,
  };
  (task.action)(&context)?;
  Ok(TaskOutcome::Executed(prints))
}
