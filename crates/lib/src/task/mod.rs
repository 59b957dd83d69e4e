//! Units of deferred work and the scheduler they are registered with.
//!
//! Nothing in this crate executes expensive work at registration time.
//! Algorithm runs and prebuilds are turned into [`Task`]s and handed to a
//! [`Scheduler`]; when and how they run is the scheduler's business.
//! [`LocalScheduler`] is an in-process implementation that runs tasks in
//! dependency waves on tokio.

mod dag;
mod history;
mod local;
mod types;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use dag::TaskGraph;
pub use history::{HistoryEntry, TaskHistory};
pub use local::LocalScheduler;
pub use types::{RegisterError, RunReport, ScheduleError, TaskError};

/// Unique identifier of a registered task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for TaskId {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

/// How many cores a task asks the scheduler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreRequest {
  #[default]
  One,
  /// Everything the scheduler has.
  All,
}

/// Passed to a task's action when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
  pub id: TaskId,
  /// Cores granted by the scheduler.
  pub cores: usize,
}

/// Something a task's result depends on beyond its declared outputs.
///
/// When an invariant's fingerprint changes, the task must run again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Invariant {
  /// The content of a file.
  FileChecksum(PathBuf),
  /// A named set of parameters. Ordered, so insertion order is irrelevant.
  Parameters {
    key: String,
    values: BTreeMap<String, String>,
  },
}

impl Invariant {
  /// Key under which this invariant is remembered between runs.
  pub fn key(&self) -> String {
    match self {
      Invariant::FileChecksum(path) => format!("file:{}", path.display()),
      Invariant::Parameters { key, .. } => format!("params:{}", key),
    }
  }
}

pub type TaskAction = Arc<dyn Fn(&TaskContext) -> Result<(), TaskError> + Send + Sync>;
pub type TaskValidation = Arc<dyn Fn() -> Result<(), TaskError> + Send + Sync>;

/// A unit of deferred, idempotent work.
#[derive(Clone)]
pub struct Task {
  pub id: TaskId,
  pub action: TaskAction,
  /// Files the action produces. A missing one means the task must run.
  pub outputs: Vec<PathBuf>,
  pub dependencies: Vec<TaskId>,
  pub invariants: Vec<Invariant>,
  pub cores: CoreRequest,
  /// Checked every time before deciding whether the action runs. An error
  /// fails the task without running the action.
  pub validation: Option<TaskValidation>,
}

impl Task {
  pub fn new<F>(id: impl Into<String>, action: F) -> Self
  where
    F: Fn(&TaskContext) -> Result<(), TaskError> + Send + Sync + 'static,
  {
    Self {
      id: TaskId::new(id),
      action: Arc::new(action),
      outputs: Vec::new(),
      dependencies: Vec::new(),
      invariants: Vec::new(),
      cores: CoreRequest::One,
      validation: None,
    }
  }

  pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
    self.outputs.push(path.into());
    self
  }

  pub fn with_outputs(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
    self.outputs.extend(paths);
    self
  }

  pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
    self.dependencies.extend(dependencies);
    self
  }

  pub fn with_invariant(mut self, invariant: Invariant) -> Self {
    self.invariants.push(invariant);
    self
  }

  pub fn with_cores(mut self, cores: CoreRequest) -> Self {
    self.cores = cores;
    self
  }

  pub fn with_validation<F>(mut self, validation: F) -> Self
  where
    F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
  {
    self.validation = Some(Arc::new(validation));
    self
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("id", &self.id)
      .field("outputs", &self.outputs)
      .field("dependencies", &self.dependencies)
      .field("invariants", &self.invariants)
      .field("cores", &self.cores)
      .field("validation", &self.validation.is_some())
      .finish_non_exhaustive()
  }
}

/// A dependency-aware executor that deferred work is registered with.
///
/// Registration must be cheap; implementations decide ordering, parallelism
/// and whether a task is up to date.
pub trait Scheduler {
  fn register(&mut self, task: Task) -> Result<TaskId, RegisterError>;

  fn is_registered(&self, id: &TaskId) -> bool;
}
