//! Registering algorithm runs as scheduler tasks.
//!
//! A run into `output_directory` really writes into
//! `output_directory/{version}`, next to these side files:
//!
//! - `stdout.txt`, `stderr.txt`: captured output
//! - `cmd.txt`: the executed argv as a JSON array
//! - `sentinel.txt`: written last, only on success
//!
//! ```text
//! run time: 12.34 seconds
//! return code: 0
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::command::execute_command;
use super::types::ToolError;
use super::{AlgorithmHandle, ExternalAlgorithm};
use crate::task::{CoreRequest, Invariant, RegisterError, Scheduler, Task, TaskError, TaskId};

pub const SENTINEL_FILE: &str = "sentinel.txt";
pub const STDOUT_FILE: &str = "stdout.txt";
pub const STDERR_FILE: &str = "stderr.txt";
pub const CMD_FILE: &str = "cmd.txt";

/// Called with the run's output directory after the tool succeeded.
pub type PostProcess = Arc<dyn Fn(&Path) -> Result<(), String> + Send + Sync>;

/// Per-run inputs besides the output directory.
pub struct RunOptions<Args> {
  pub arguments: Args,
  /// Parameters the result depends on; changing any reruns the tool.
  pub parameters: BTreeMap<String, String>,
  pub post_process: Option<PostProcess>,
  pub dependencies: Vec<TaskId>,
}

impl<Args> RunOptions<Args> {
  pub fn new(arguments: Args) -> Self {
    Self {
      arguments,
      parameters: BTreeMap::new(),
      post_process: None,
      dependencies: Vec::new(),
    }
  }

  pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.parameters.insert(key.into(), value.into());
    self
  }

  pub fn with_post_process<F>(mut self, post_process: F) -> Self
  where
    F: Fn(&Path) -> Result<(), String> + Send + Sync + 'static,
  {
    self.post_process = Some(Arc::new(post_process));
    self
  }

  pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
    self.dependencies.extend(dependencies);
    self
  }
}

/// Handle to a registered run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmRun {
  pub task_id: TaskId,
  pub output_dir: PathBuf,
}

impl AlgorithmRun {
  pub fn sentinel(&self) -> PathBuf {
    self.output_dir.join(SENTINEL_FILE)
  }

  pub fn stdout(&self) -> PathBuf {
    self.output_dir.join(STDOUT_FILE)
  }

  pub fn stderr(&self) -> PathBuf {
    self.output_dir.join(STDERR_FILE)
  }

  pub fn cmd(&self) -> PathBuf {
    self.output_dir.join(CMD_FILE)
  }
}

pub(crate) fn sentinel_text(elapsed: Duration, code: Option<i32>) -> String {
  let code = code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string());
  format!("run time: {:.2} seconds\nreturn code: {}", elapsed.as_secs_f64(), code)
}

impl<A: ExternalAlgorithm> AlgorithmHandle<A> {
  /// Register a run of this tool with `scheduler`.
  ///
  /// When the scheduler runs the task it unpacks the archive, runs the
  /// command, applies [`ExternalAlgorithm::check_success`], calls the
  /// post-processing callback and finally writes the sentinel. The task is
  /// invalidated by a change of the archive's content or of `parameters`.
  pub fn run(
    &self,
    scheduler: &mut dyn Scheduler,
    output_directory: impl Into<PathBuf>,
    options: RunOptions<A::Args>,
  ) -> Result<AlgorithmRun, RegisterError> {
    let output_dir = self.output_dir(&output_directory.into());
    let task_id = TaskId::new(format!("algorithm:{}:{}", self.name(), output_dir.display()));
    let sentinel = output_dir.join(SENTINEL_FILE);

    let RunOptions {
      arguments,
      parameters,
      post_process,
      dependencies,
    } = options;

    let handle = self.clone();
    let action_dir = output_dir.clone();
    let action = move |ctx: &crate::task::TaskContext| -> Result<(), TaskError> {
      handle.execute(&action_dir, ctx.cores, &arguments, post_process.as_ref())?;
      Ok(())
    };

    let mut task = Task::new(task_id.0.clone(), action)
      .with_output(&sentinel)
      .depends_on(dependencies)
      .with_invariant(Invariant::FileChecksum(self.archive_path()))
      .with_cores(if self.algorithm().multi_core() {
        CoreRequest::All
      } else {
        CoreRequest::One
      });
    if !parameters.is_empty() {
      task = task.with_invariant(Invariant::Parameters {
        key: output_dir.display().to_string(),
        values: parameters,
      });
    }

    scheduler.register(task)?;
    Ok(AlgorithmRun { task_id, output_dir })
  }

  /// Unpack, run and judge the tool. Blocking; this is what a run task does.
  pub fn execute(
    &self,
    output_dir: &Path,
    ncores: usize,
    arguments: &A::Args,
    post_process: Option<&PostProcess>,
  ) -> Result<(), TaskError> {
    self.store.ensure_unpacked(self.name(), self.version())?;
    fs::create_dir_all(output_dir).map_err(ToolError::io(output_dir))?;

    let spec = self.command(output_dir, ncores, arguments)?;
    let cmd_path = output_dir.join(CMD_FILE);
    let argv = serde_json::to_string(&spec.argv()).map_err(|e| ToolError::InvalidArguments {
      tool: self.name().to_string(),
      message: e.to_string(),
    })?;
    fs::write(&cmd_path, argv).map_err(ToolError::io(&cmd_path))?;

    let record = execute_command(&spec, &output_dir.join(STDOUT_FILE), &output_dir.join(STDERR_FILE))?;

    let stdout = record.read_stdout()?;
    let stderr = record.read_stderr()?;
    if let Err(reason) = self.algorithm().check_success(record.code, &stdout, &stderr) {
      return Err(
        ToolError::Failed {
          tool: self.name().to_string(),
          reason,
          command: spec.to_string(),
        }
        .into(),
      );
    }

    if let Some(post_process) = post_process {
      post_process(output_dir).map_err(|message| ToolError::PostProcess {
        tool: self.name().to_string(),
        message,
      })?;
    }

    let sentinel_path = output_dir.join(SENTINEL_FILE);
    fs::write(&sentinel_path, sentinel_text(record.elapsed, record.code)).map_err(ToolError::io(&sentinel_path))?;
    info!(
      tool = %self.name(),
      version = %self.version(),
      elapsed_s = record.elapsed.as_secs_f64(),
      "tool run complete"
    );
    Ok(())
  }
}
