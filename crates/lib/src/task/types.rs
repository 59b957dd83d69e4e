//! Error and result types for task registration and execution.

use thiserror::Error;

use crate::algorithm::ToolError;
use crate::prebuild::PrebuildError;
use crate::store::StoreError;
use crate::util::hash::HashError;

use super::TaskId;

/// Errors raised while registering a task.
#[derive(Debug, Error)]
pub enum RegisterError {
  /// A task with this id was already registered.
  #[error("task {0} is already registered")]
  DuplicateTask(TaskId),

  /// A dependency names a task that has not been registered.
  #[error("task {task} depends on unregistered task {dependency}")]
  UnknownDependency { task: TaskId, dependency: TaskId },
}

/// Errors raised by a task's validation or action.
#[derive(Debug, Error)]
pub enum TaskError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Prebuild(#[from] PrebuildError),

  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Free-form failure from a caller-supplied action.
  #[error("{0}")]
  Action(String),
}

/// Errors raised while running registered tasks.
#[derive(Debug, Error)]
pub enum ScheduleError {
  /// Cycle detected in the dependency graph.
  #[error("dependency cycle detected")]
  CycleDetected,

  /// A task's validation or action failed; later waves were not run.
  #[error("task {id} failed: {source}")]
  TaskFailed {
    id: TaskId,
    #[source]
    source: TaskError,
  },

  #[error("failed to access task history: {0}")]
  History(String),

  /// A task panicked or its worker could not be joined.
  #[error("task worker failed: {0}")]
  Join(String),
}

impl ScheduleError {
  /// The task error behind a [`ScheduleError::TaskFailed`].
  pub fn task_error(&self) -> Option<&TaskError> {
    match self {
      ScheduleError::TaskFailed { source, .. } => Some(source),
      _ => None,
    }
  }
}

/// What happened during one [`LocalScheduler::run`](super::LocalScheduler::run).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
  /// Tasks whose action was invoked, in completion order per wave.
  pub executed: Vec<TaskId>,
  /// Tasks found up to date and skipped.
  pub up_to_date: Vec<TaskId>,
}

impl RunReport {
  pub fn was_executed(&self, id: &TaskId) -> bool {
    self.executed.contains(id)
  }
}
