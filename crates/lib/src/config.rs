//! Environment-driven configuration.
//!
//! The library itself takes every location as a constructor parameter; this
//! module is the one place that reads the environment, for the CLI and for
//! pipeline code that wants the conventional layout.
//!
//! | Variable               | Meaning                                         | Default                 |
//! |------------------------|-------------------------------------------------|-------------------------|
//! | `EXTERNA_STORE`        | store base; archives in `zip/`, trees in `unpack/` | `<data_dir>/store`   |
//! | `EXTERNA_STORE_PEERS`  | other hosts' archive directories (path list)    | none                    |
//! | `EXTERNA_PREBUILD`     | prebuild root shared between hosts              | none                    |
//! | `EXTERNA_HOST`         | host identifier                                 | machine hostname        |
//! | `EXTERNA_ARCHIVE_EXT`  | archive extension                               | `.tar.gz`               |

use std::path::PathBuf;

use thiserror::Error;

use crate::platform;
use crate::platform::paths::data_dir;
use crate::prebuild::{PrebuildError, PrebuildManager};
use crate::store::{ArchiveStore, DEFAULT_ARCHIVE_EXTENSION, StoreError};

pub const STORE_ENV: &str = "EXTERNA_STORE";
pub const PEERS_ENV: &str = "EXTERNA_STORE_PEERS";
pub const PREBUILD_ENV: &str = "EXTERNA_PREBUILD";
pub const HOST_ENV: &str = "EXTERNA_HOST";
pub const ARCHIVE_EXT_ENV: &str = "EXTERNA_ARCHIVE_EXT";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("cannot locate a default store: neither {STORE_ENV} nor a home directory is set")]
  NoDataDir,

  #[error("no prebuild root configured; set {PREBUILD_ENV}")]
  PrebuildRootUnset,

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Prebuild(#[from] PrebuildError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub store_root: PathBuf,
  pub peers: Vec<PathBuf>,
  pub prebuild_root: Option<PathBuf>,
  pub host: String,
  pub archive_extension: String,
}

impl Config {
  /// Resolve the configuration from `EXTERNA_*` variables.
  pub fn from_env() -> Result<Self, ConfigError> {
    let store_root = match env_path(STORE_ENV) {
      Some(path) => path,
      None => data_dir().ok_or(ConfigError::NoDataDir)?.join("store"),
    };

    let peers = std::env::var_os(PEERS_ENV)
      .map(|raw| std::env::split_paths(&raw).filter(|p| !p.as_os_str().is_empty()).collect())
      .unwrap_or_default();

    let host = match std::env::var(HOST_ENV) {
      Ok(host) if !host.trim().is_empty() => platform::sanitize_host(&host),
      _ => platform::hostname(),
    };

    let archive_extension = match std::env::var(ARCHIVE_EXT_ENV) {
      Ok(ext) if !ext.is_empty() => normalize_extension(&ext),
      _ => DEFAULT_ARCHIVE_EXTENSION.to_string(),
    };

    Ok(Self {
      store_root,
      peers,
      prebuild_root: env_path(PREBUILD_ENV),
      host,
      archive_extension,
    })
  }

  pub fn archive_dir(&self) -> PathBuf {
    self.store_root.join("zip")
  }

  pub fn unpack_dir(&self) -> PathBuf {
    self.store_root.join("unpack")
  }

  /// A store handle for this configuration. No I/O is performed.
  pub fn store(&self) -> ArchiveStore {
    ArchiveStore::new(self.archive_dir(), self.unpack_dir())
      .with_extension(self.archive_extension.clone())
      .with_peers(self.peers.clone())
  }

  /// Like [`store`](Self::store), creating the store directories.
  pub fn open_store(&self) -> Result<ArchiveStore, ConfigError> {
    Ok(
      ArchiveStore::init(self.archive_dir(), self.unpack_dir())?
        .with_extension(self.archive_extension.clone())
        .with_peers(self.peers.clone()),
    )
  }

  pub fn prebuild_manager(&self) -> Result<PrebuildManager, ConfigError> {
    let root = self.prebuild_root.as_ref().ok_or(ConfigError::PrebuildRootUnset)?;
    Ok(PrebuildManager::new(root, &self.host)?)
  }
}

fn env_path(key: &str) -> Option<PathBuf> {
  std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn normalize_extension(ext: &str) -> String {
  if ext.starts_with('.') {
    ext.to_string()
  } else {
    format!(".{}", ext)
  }
}
