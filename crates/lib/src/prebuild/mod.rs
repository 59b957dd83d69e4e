//! Host-namespaced prebuilt artifacts shared between machines.
//!
//! Artifacts live at `{root}/{host}/{name}/{version}/`. Every host may read
//! every other host's artifacts but only ever writes below its own
//! `{root}/{host}`. A version directory counts as built once its
//! [`DONE_MARKER`] exists; it is written last.
//!
//! Resolving a request for `(name, version)`:
//!
//! 1. collect built versions from all hosts, this host winning ties;
//! 2. the requested version itself, if built, is used as is;
//! 3. otherwise the highest built version in
//!    `[minimum_acceptable_version, maximum_acceptable_version)` whose stored
//!    build function identity equals the current one;
//! 4. otherwise the requested version is built on this host.
//!
//! Reused artifacts are still validated when the task runs: a changed build
//! function or changed input file content fails with
//! [`PrebuildError::UpstreamChanged`], and partially present outputs fail with
//! [`PrebuildError::InconsistentState`]. Neither is repaired automatically.

mod artifact;
mod function;
mod inputs;
mod job;
mod types;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

pub use function::{BuildFunction, BuildResult, FunctionIdentity, build_fn};
pub use inputs::{InputFileInvariant, compute_invariants, find_drift};
pub use job::{PrebuildJob, PrebuildRequest};
pub use types::{
  CHECKSUM_SUFFIX, DONE_MARKER, DoneMarker, FUNCTION_RECORD, INPUTS_RECORD, PrebuildError, Resolution,
  ResolutionKind, UpstreamChange,
};

use crate::task::{Scheduler, Task, TaskId};
use crate::version::{Version, VersionRange};

/// One built or half-built artifact directory, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
  pub host: String,
  pub version: Version,
  pub path: PathBuf,
  pub complete: bool,
  pub completed_at: Option<u64>,
}

/// Resolves and registers prebuilds below a shared root.
#[derive(Debug, Clone)]
pub struct PrebuildManager {
  root: PathBuf,
  host: String,
}

impl PrebuildManager {
  /// A manager for `host`, creating `{root}/{host}` if needed.
  pub fn new(root: impl Into<PathBuf>, host: impl Into<String>) -> Result<Self, PrebuildError> {
    let manager = Self {
      root: root.into(),
      host: host.into(),
    };
    let host_dir = manager.host_dir();
    fs::create_dir_all(&host_dir).map_err(PrebuildError::io(&host_dir))?;
    Ok(manager)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn host(&self) -> &str {
    &self.host
  }

  pub fn host_dir(&self) -> PathBuf {
    self.root.join(&self.host)
  }

  /// Where this host builds `name` at `version`.
  pub fn local_path(&self, name: &str, version: &Version) -> PathBuf {
    self.host_dir().join(name).join(version.as_str())
  }

  /// Host directories, other hosts sorted first and this host last.
  fn hosts(&self) -> Result<Vec<String>, PrebuildError> {
    let mut others = Vec::new();
    let entries = match fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![self.host.clone()]),
      Err(e) => return Err(PrebuildError::io(&self.root)(e)),
    };
    for entry in entries {
      let entry = entry.map_err(PrebuildError::io(&self.root))?;
      if !entry.path().is_dir() {
        continue;
      }
      let Some(host) = entry.file_name().to_str().map(str::to_string) else {
        continue;
      };
      if host != self.host {
        others.push(host);
      }
    }
    others.sort();
    others.push(self.host.clone());
    Ok(others)
  }

  /// Every artifact directory of `name` on any host, complete or not.
  pub fn artifacts(&self, name: &str) -> Result<Vec<ArtifactInfo>, PrebuildError> {
    let mut found = Vec::new();
    for host in self.hosts()? {
      let name_dir = self.root.join(&host).join(name);
      let entries = match fs::read_dir(&name_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
        Err(e) => return Err(PrebuildError::io(&name_dir)(e)),
      };
      for entry in entries {
        let entry = entry.map_err(PrebuildError::io(&name_dir))?;
        let path = entry.path();
        if !path.is_dir() {
          continue;
        }
        let Some(version) = entry.file_name().to_str().map(Version::from) else {
          continue;
        };
        let marker = artifact::read_marker(&path)?;
        found.push(ArtifactInfo {
          host: host.clone(),
          version,
          complete: marker.is_some(),
          completed_at: marker.map(|m| m.completed_at),
          path,
        });
      }
    }
    found.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.host.cmp(&b.host)));
    Ok(found)
  }

  /// Completed versions of `name` and their directories.
  ///
  /// When several hosts built the same version, this host's copy wins.
  pub fn find_versions(&self, name: &str) -> Result<BTreeMap<Version, PathBuf>, PrebuildError> {
    let mut versions = BTreeMap::new();
    for host in self.hosts()? {
      let name_dir = self.root.join(&host).join(name);
      let entries = match fs::read_dir(&name_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
        Err(e) => return Err(PrebuildError::io(&name_dir)(e)),
      };
      for entry in entries {
        let entry = entry.map_err(PrebuildError::io(&name_dir))?;
        let path = entry.path();
        if !artifact::is_complete(&path) {
          continue;
        }
        if let Some(version) = entry.file_name().to_str() {
          versions.insert(Version::from(version), path);
        }
      }
    }
    Ok(versions)
  }

  /// Decide which artifact directory satisfies a request. Performs no writes.
  pub fn resolve(
    &self,
    name: &str,
    version: &Version,
    range: &VersionRange,
    identity: &FunctionIdentity,
  ) -> Result<Resolution, PrebuildError> {
    let available = self.find_versions(name)?;

    if let Some(path) = available.get(version) {
      return Ok(Resolution {
        version: version.clone(),
        output_path: path.clone(),
        kind: ResolutionKind::Exact,
      });
    }

    for (candidate, path) in available.iter().rev() {
      if !range.contains(candidate) {
        continue;
      }
      match artifact::read_function(path)? {
        Some(stored) if &stored == identity => {
          return Ok(Resolution {
            version: candidate.clone(),
            output_path: path.clone(),
            kind: ResolutionKind::Compatible,
          });
        }
        _ => debug!(name, version = %candidate, "build function differs, not reusing"),
      }
    }

    Ok(Resolution {
      version: version.clone(),
      output_path: self.local_path(name, version),
      kind: ResolutionKind::Build,
    })
  }

  /// Resolve `request` and register a task that builds or validates it.
  pub fn prebuild(
    &self,
    scheduler: &mut dyn Scheduler,
    request: PrebuildRequest,
  ) -> Result<PrebuildJob, PrebuildError> {
    for output in &request.outputs {
      job::check_output(output)?;
    }

    let identity = request.build.identity();
    let range = VersionRange::new(
      Some(
        request
          .minimum_acceptable_version
          .clone()
          .unwrap_or_else(|| request.version.clone()),
      ),
      request.maximum_acceptable_version.clone(),
    );
    let resolution = self.resolve(&request.name, &request.version, &range, &identity)?;
    info!(
      name = %request.name,
      requested = %request.version,
      version = %resolution.version,
      kind = ?resolution.kind,
      path = %resolution.output_path.display(),
      "prebuild resolved"
    );

    let artifact_dir = resolution.output_path.clone();
    let outputs: Vec<PathBuf> = request.outputs.iter().map(|o| artifact_dir.join(o)).collect();
    let mut expected = outputs.clone();
    expected.push(artifact_dir.join(DONE_MARKER));
    artifact::check_consistent(&artifact_dir, &expected)?;

    let mut sorted: Vec<String> = expected.iter().map(|p| p.display().to_string()).collect();
    sorted.sort();
    let task_id = TaskId::new(format!("prebuild:{}", sorted.join(":")));
    let job = PrebuildJob {
      name: request.name.clone(),
      requested_version: request.version.clone(),
      version: resolution.version.clone(),
      output_path: artifact_dir.clone(),
      outputs: outputs.clone(),
      kind: resolution.kind,
      task_id: task_id.clone(),
    };
    if scheduler.is_registered(&task_id) {
      debug!(task = %task_id, "prebuild already registered, sharing it");
      return Ok(job);
    }

    let own_host = artifact_dir.starts_with(self.host_dir());
    let check = ArtifactCheck {
      artifact_dir: artifact_dir.clone(),
      expected: expected.clone(),
      identity,
      inputs: request.inputs.clone(),
      own_host,
    };
    let build = ArtifactBuild {
      name: request.name.clone(),
      version: resolution.version.clone(),
      artifact_dir,
      outputs,
      inputs: request.inputs.clone(),
      build: request.build.clone(),
    };

    let task = Task::new(task_id.0.clone(), move |_| Ok(build.run()?))
      .with_outputs(expected)
      .depends_on(request.dependencies.iter().cloned())
      .with_validation(move || Ok(check.run()?));
    scheduler.register(task)?;
    Ok(job)
  }
}

/// Runs before the build decision, every time.
struct ArtifactCheck {
  artifact_dir: PathBuf,
  expected: Vec<PathBuf>,
  identity: FunctionIdentity,
  inputs: Vec<PathBuf>,
  own_host: bool,
}

impl ArtifactCheck {
  fn run(&self) -> Result<(), PrebuildError> {
    artifact::check_consistent(&self.artifact_dir, &self.expected)?;
    if !artifact::is_complete(&self.artifact_dir) {
      return Ok(());
    }

    if let Some(stored) = artifact::read_function(&self.artifact_dir)?
      && stored != self.identity
    {
      return Err(PrebuildError::UpstreamChanged {
        artifact: self.artifact_dir.clone(),
        reason: UpstreamChange::BuildFunction,
      });
    }

    let Some(recorded) = inputs::load_record(&self.artifact_dir)? else {
      if self.own_host {
        debug!(artifact = %self.artifact_dir.display(), "recording prebuild inputs");
        inputs::save_record(&self.artifact_dir, &compute_invariants(&self.inputs, &[])?)?;
      }
      return Ok(());
    };
    let current = compute_invariants(&self.inputs, &recorded)?;
    if let Some(path) = find_drift(&recorded, &current) {
      warn!(artifact = %self.artifact_dir.display(), input = %path.display(), "prebuild input changed");
      return Err(PrebuildError::UpstreamChanged {
        artifact: self.artifact_dir.clone(),
        reason: UpstreamChange::InputFile(path.to_path_buf()),
      });
    }
    if self.own_host && current != recorded {
      inputs::save_record(&self.artifact_dir, &current)?;
    }
    Ok(())
  }
}

/// The task action: build once, then record everything, marker last.
///
/// Inputs are fingerprinted before the build runs, so an input changing
/// mid-build shows up as drift on the next check.
struct ArtifactBuild {
  name: String,
  version: Version,
  artifact_dir: PathBuf,
  outputs: Vec<PathBuf>,
  inputs: Vec<PathBuf>,
  build: Arc<dyn BuildFunction>,
}

impl ArtifactBuild {
  fn run(&self) -> Result<(), PrebuildError> {
    if artifact::is_complete(&self.artifact_dir) {
      debug!(artifact = %self.artifact_dir.display(), "prebuild already complete");
      return Ok(());
    }

    fs::create_dir_all(&self.artifact_dir).map_err(PrebuildError::io(&self.artifact_dir))?;
    let observed = compute_invariants(&self.inputs, &[])?;
    info!(name = %self.name, version = %self.version, "building prebuild");
    self.build.build(&self.artifact_dir).map_err(|e| PrebuildError::Build {
      name: self.name.clone(),
      version: self.version.clone(),
      message: e.to_string(),
    })?;

    let missing: Vec<PathBuf> = self.outputs.iter().filter(|o| !o.exists()).cloned().collect();
    if !missing.is_empty() {
      let present = self.outputs.iter().filter(|o| o.exists()).cloned().collect();
      return Err(PrebuildError::InconsistentState {
        artifact: self.artifact_dir.clone(),
        present,
        missing,
      });
    }

    artifact::write_checksums(&self.outputs)?;
    artifact::write_function(&self.artifact_dir, &self.build.identity())?;
    inputs::save_record(&self.artifact_dir, &observed)?;
    artifact::write_marker(&self.artifact_dir)?;
    info!(name = %self.name, version = %self.version, "prebuild complete");
    Ok(())
  }
}
