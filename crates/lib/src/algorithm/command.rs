//! Command specifications and their execution.
//!
//! Building a command is pure: [`CommandSpec`] is a plain value that can be
//! inspected, compared and logged. Only [`execute_command`] touches the system.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::types::ToolError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
  pub program: PathBuf,
  pub args: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cwd: Option<PathBuf>,
  #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
  pub env: BTreeMap<String, String>,
}

impl CommandSpec {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      env: BTreeMap::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn arg_path(self, path: &Path) -> Self {
    let arg = path.to_string_lossy().into_owned();
    self.arg(arg)
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  /// Program followed by its arguments.
  pub fn argv(&self) -> Vec<String> {
    let mut argv = Vec::with_capacity(self.args.len() + 1);
    argv.push(self.program.to_string_lossy().into_owned());
    argv.extend(self.args.iter().cloned());
    argv
  }

  pub fn to_command(&self) -> Command {
    let mut command = Command::new(&self.program);
    command.args(&self.args);
    if let Some(cwd) = &self.cwd {
      command.current_dir(cwd);
    }
    for (key, value) in &self.env {
      command.env(key, value);
    }
    command
  }
}

impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let quoted: Vec<String> = self.argv().iter().map(|a| quote(a)).collect();
    f.write_str(&quoted.join(" "))
  }
}

fn quote(arg: &str) -> String {
  let plain = !arg.is_empty()
    && arg
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '+' | '@'));
  if plain {
    arg.to_string()
  } else {
    format!("'{}'", arg.replace('\'', r"'\''"))
  }
}

/// What a finished subprocess left behind.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
  /// Exit code; `None` if the process was killed by a signal.
  pub code: Option<i32>,
  pub stdout: PathBuf,
  pub stderr: PathBuf,
  pub elapsed: Duration,
}

impl ExecutionRecord {
  pub fn read_stdout(&self) -> Result<Vec<u8>, ToolError> {
    fs::read(&self.stdout).map_err(ToolError::io(&self.stdout))
  }

  pub fn read_stderr(&self) -> Result<Vec<u8>, ToolError> {
    fs::read(&self.stderr).map_err(ToolError::io(&self.stderr))
  }
}

/// Run `spec` to completion with stdout and stderr going straight to the
/// given files. Blocking.
///
/// Both files are created before the process starts, so whatever it wrote is
/// on disk even if it is killed. A non-zero exit is not an error here; judging
/// success is up to the caller.
pub fn execute_command(spec: &CommandSpec, stdout: &Path, stderr: &Path) -> Result<ExecutionRecord, ToolError> {
  let stdout_file = File::create(stdout).map_err(ToolError::io(stdout))?;
  let stderr_file = File::create(stderr).map_err(ToolError::io(stderr))?;

  info!(command = %spec, stdout = %stdout.display(), "executing command");
  let started = Instant::now();

  let status = spec
    .to_command()
    .stdin(Stdio::null())
    .stdout(Stdio::from(stdout_file))
    .stderr(Stdio::from(stderr_file))
    .status()
    .map_err(|source| ToolError::Spawn {
      command: spec.to_string(),
      source,
    })?;

  let elapsed = started.elapsed();
  debug!(code = ?status.code(), elapsed_ms = elapsed.as_millis() as u64, "command finished");

  Ok(ExecutionRecord {
    code: status.code(),
    stdout: stdout.to_path_buf(),
    stderr: stderr.to_path_buf(),
    elapsed,
  })
}
