//! Prebuild requests and the jobs they resolve into.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::function::BuildFunction;
use super::types::{PrebuildError, ResolutionKind};
use crate::task::TaskId;
use crate::version::Version;

/// What to prebuild: a named, versioned artifact and how to make it.
#[derive(Clone)]
pub struct PrebuildRequest {
  pub name: String,
  pub version: Version,
  pub inputs: Vec<PathBuf>,
  /// Relative to the artifact directory.
  pub outputs: Vec<PathBuf>,
  pub build: Arc<dyn BuildFunction>,
  /// Defaults to `version`.
  pub minimum_acceptable_version: Option<Version>,
  /// Exclusive; unbounded when `None`.
  pub maximum_acceptable_version: Option<Version>,
  pub dependencies: Vec<TaskId>,
}

impl PrebuildRequest {
  pub fn new(name: impl Into<String>, version: impl Into<Version>, build: Arc<dyn BuildFunction>) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      build,
      minimum_acceptable_version: None,
      maximum_acceptable_version: None,
      dependencies: Vec::new(),
    }
  }

  pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
    self.inputs.push(path.into());
    self
  }

  pub fn inputs(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
    self.inputs.extend(paths);
    self
  }

  pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
    self.outputs.push(path.into());
    self
  }

  pub fn outputs(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
    self.outputs.extend(paths);
    self
  }

  pub fn minimum_acceptable_version(mut self, version: impl Into<Version>) -> Self {
    self.minimum_acceptable_version = Some(version.into());
    self
  }

  pub fn maximum_acceptable_version(mut self, version: impl Into<Version>) -> Self {
    self.maximum_acceptable_version = Some(version.into());
    self
  }

  pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
    self.dependencies.extend(dependencies);
    self
  }
}

impl std::fmt::Debug for PrebuildRequest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PrebuildRequest")
      .field("name", &self.name)
      .field("version", &self.version)
      .field("inputs", &self.inputs)
      .field("outputs", &self.outputs)
      .field("identity", &self.build.identity())
      .field("minimum_acceptable_version", &self.minimum_acceptable_version)
      .field("maximum_acceptable_version", &self.maximum_acceptable_version)
      .finish_non_exhaustive()
  }
}

/// A registered prebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuildJob {
  pub(crate) name: String,
  pub(crate) requested_version: Version,
  pub(crate) version: Version,
  pub(crate) output_path: PathBuf,
  pub(crate) outputs: Vec<PathBuf>,
  pub(crate) kind: ResolutionKind,
  pub(crate) task_id: TaskId,
}

impl PrebuildJob {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// The version that is (or will be) used; may be older than requested.
  pub fn version(&self) -> &Version {
    &self.version
  }

  pub fn requested_version(&self) -> &Version {
    &self.requested_version
  }

  pub fn output_path(&self) -> &Path {
    &self.output_path
  }

  /// Declared outputs as absolute paths.
  pub fn outputs(&self) -> &[PathBuf] {
    &self.outputs
  }

  pub fn kind(&self) -> ResolutionKind {
    self.kind
  }

  pub fn task_id(&self) -> &TaskId {
    &self.task_id
  }

  /// Path of a declared output.
  pub fn find_file(&self, name: impl AsRef<Path>) -> Result<PathBuf, PrebuildError> {
    let wanted = normalize(&self.output_path.join(name.as_ref()));
    self
      .outputs
      .iter()
      .find(|output| normalize(output) == wanted)
      .cloned()
      .ok_or_else(|| PrebuildError::FileNotDeclared {
        artifact: self.output_path.clone(),
        file: name.as_ref().to_path_buf(),
      })
  }

  /// `output_path/name`, declared or not.
  pub fn name_file(&self, name: impl AsRef<Path>) -> PathBuf {
    self.output_path.join(name)
  }
}

fn normalize(path: &Path) -> PathBuf {
  let mut normalized = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        normalized.pop();
      }
      other => normalized.push(other),
    }
  }
  normalized
}

/// Declared outputs must stay inside the artifact directory.
pub(crate) fn check_output(path: &Path) -> Result<(), PrebuildError> {
  let escapes = path.as_os_str().is_empty()
    || path
      .components()
      .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
  if escapes {
    return Err(PrebuildError::InvalidOutput {
      path: path.to_path_buf(),
    });
  }
  Ok(())
}
