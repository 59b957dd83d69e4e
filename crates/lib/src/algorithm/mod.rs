//! External algorithms: third-party tools shipped as versioned archives.
//!
//! Each wrapped tool implements [`ExternalAlgorithm`]. Resolving one against
//! an [`ArchiveStore`] picks a concrete version (recording it in the working
//! directory's [`VersionLedger`]) and yields an [`AlgorithmHandle`], which
//! builds command lines purely and registers runs with a [`Scheduler`](crate::task::Scheduler).
//!
//! ```ignore
//! let externals = Externals::new(store, VersionLedger::in_current_dir()?);
//! let fastqc = externals.algorithm(FastQc, "_last_used")?;
//! let run = fastqc.run(&mut scheduler, "results/qc", RunOptions::new(inputs))?;
//! ```

mod command;
mod run;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::ledger::VersionLedger;
use crate::store::{ArchiveStore, StoreError};
use crate::version::{Version, VersionRequest};

pub use command::{CommandSpec, ExecutionRecord, execute_command};
pub use run::{AlgorithmRun, CMD_FILE, PostProcess, RunOptions, SENTINEL_FILE, STDERR_FILE, STDOUT_FILE};
pub use types::{Binding, ResolveError, ToolError};

/// The capability every wrapped tool provides.
pub trait ExternalAlgorithm: Send + Sync + 'static {
  /// Tool-specific arguments passed to [`build_cmd`](Self::build_cmd).
  type Args: Send + Sync + 'static;

  /// Unique name; also the archive name prefix in the store.
  fn name(&self) -> &str;

  /// The command line for one run. Must be pure and deterministic.
  fn build_cmd(
    &self,
    binding: &Binding,
    output_dir: &Path,
    ncores: usize,
    args: &Self::Args,
  ) -> Result<CommandSpec, ToolError>;

  /// Whether the tool can use more than one core.
  fn multi_core(&self) -> bool {
    false
  }

  /// Judge a finished run. `Err` carries the reason shown to the user.
  fn check_success(&self, code: Option<i32>, _stdout: &[u8], _stderr: &[u8]) -> Result<(), String> {
    match code {
      Some(0) => Ok(()),
      Some(code) => Err(format!("Return code != 0: {}", code)),
      None => Err("terminated by signal".to_string()),
    }
  }

  /// Download and register the newest release. The default fetches nothing.
  fn fetch_latest_version(&self, _store: &ArchiveStore) -> Result<(), StoreError> {
    Ok(())
  }
}

/// Pick the concrete version `request` refers to and record it in `ledger`.
pub fn resolve_version<A: ExternalAlgorithm + ?Sized>(
  algorithm: &A,
  store: &ArchiveStore,
  ledger: &VersionLedger,
  request: &VersionRequest,
) -> Result<Version, ResolveError> {
  let name = algorithm.name();

  let request = match request {
    VersionRequest::LastUsed => match ledger.get(name)? {
      Some(version) => VersionRequest::Exact(version),
      None => VersionRequest::Latest,
    },
    other => other.clone(),
  };

  let version = match request {
    VersionRequest::Exact(version) => {
      store.require_version(name, &version)?;
      version
    }
    _ => match store.latest_version(name)? {
      Some(version) => version,
      None => {
        info!(name = %name, "no versions in store, fetching latest");
        algorithm.fetch_latest_version(store)?;
        store.invalidate(name);
        store
          .latest_version(name)?
          .ok_or_else(|| StoreError::NoVersions { name: name.to_string() })?
      }
    },
  };

  ledger.record(name, &version)?;
  Ok(version)
}

/// A tool bound to one concrete version. Immutable once resolved.
pub struct AlgorithmHandle<A: ExternalAlgorithm> {
  algorithm: Arc<A>,
  store: Arc<ArchiveStore>,
  binding: Binding,
}

impl<A: ExternalAlgorithm> AlgorithmHandle<A> {
  /// Resolve `request` for `algorithm`. Nothing is unpacked yet.
  pub fn resolve(
    algorithm: A,
    store: Arc<ArchiveStore>,
    ledger: &VersionLedger,
    request: impl Into<VersionRequest>,
  ) -> Result<Self, ResolveError> {
    let request = request.into();
    let version = resolve_version(&algorithm, &store, ledger, &request)?;
    let binding = Binding {
      name: algorithm.name().to_string(),
      path: store.unpacked_path(algorithm.name(), &version),
      version,
    };
    info!(name = %binding.name, version = %binding.version, request = %request, "resolved algorithm");

    Ok(Self {
      algorithm: Arc::new(algorithm),
      store,
      binding,
    })
  }

  pub fn algorithm(&self) -> &A {
    &self.algorithm
  }

  pub fn binding(&self) -> &Binding {
    &self.binding
  }

  pub fn name(&self) -> &str {
    &self.binding.name
  }

  pub fn version(&self) -> &Version {
    &self.binding.version
  }

  /// Unpack directory of the bound version.
  pub fn path(&self) -> &Path {
    &self.binding.path
  }

  pub fn archive_path(&self) -> PathBuf {
    self.store.archive_path(&self.binding.name, &self.binding.version)
  }

  pub fn store(&self) -> &Arc<ArchiveStore> {
    &self.store
  }

  /// Where a run into `output_directory` really writes: a per-version subdirectory.
  pub fn output_dir(&self, output_directory: &Path) -> PathBuf {
    output_directory.join(self.binding.version.as_str())
  }

  /// The command line for a run. Pure.
  pub fn command(&self, output_dir: &Path, ncores: usize, args: &A::Args) -> Result<CommandSpec, ToolError> {
    self.algorithm.build_cmd(&self.binding, output_dir, ncores, args)
  }
}

impl<A: ExternalAlgorithm> Clone for AlgorithmHandle<A> {
  fn clone(&self) -> Self {
    Self {
      algorithm: self.algorithm.clone(),
      store: self.store.clone(),
      binding: self.binding.clone(),
    }
  }
}

impl<A: ExternalAlgorithm> std::fmt::Debug for AlgorithmHandle<A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AlgorithmHandle").field("binding", &self.binding).finish_non_exhaustive()
  }
}

/// The store and ledger algorithms are resolved against.
#[derive(Debug, Clone)]
pub struct Externals {
  store: Arc<ArchiveStore>,
  ledger: Arc<VersionLedger>,
}

impl Externals {
  pub fn new(store: impl Into<Arc<ArchiveStore>>, ledger: impl Into<Arc<VersionLedger>>) -> Self {
    Self {
      store: store.into(),
      ledger: ledger.into(),
    }
  }

  pub fn store(&self) -> &Arc<ArchiveStore> {
    &self.store
  }

  pub fn ledger(&self) -> &VersionLedger {
    &self.ledger
  }

  pub fn algorithm<A: ExternalAlgorithm>(
    &self,
    algorithm: A,
    request: impl Into<VersionRequest>,
  ) -> Result<AlgorithmHandle<A>, ResolveError> {
    AlgorithmHandle::resolve(algorithm, self.store.clone(), &self.ledger, request)
  }
}
