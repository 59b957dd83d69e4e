//! Per-working-directory record of resolved algorithm versions.
//!
//! The ledger (`.externa-versions`) remembers which version of each external
//! algorithm a project last resolved, so `_last_used` requests stay stable
//! across runs.
//!
//! # Format
//!
//! ```text
//! dummy==0.10
//! whatever==0.1
//! ```
//!
//! One `name==version` line per algorithm. An update removes the old line for
//! the name and appends the new one; lines that do not parse are kept as-is.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::util::fs::write_atomic;
use crate::version::Version;

/// Ledger file name.
pub const LEDGER_FILENAME: &str = ".externa-versions";

const SEPARATOR: &str = "==";

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("failed to read ledger {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write ledger {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to determine the current directory: {0}")]
  CurrentDir(#[source] io::Error),
}

#[derive(Debug)]
pub struct VersionLedger {
  path: PathBuf,
  // Serializes read-modify-write cycles within this process.
  write_lock: Mutex<()>,
}

impl VersionLedger {
  /// A ledger stored at exactly `path`.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      write_lock: Mutex::new(()),
    }
  }

  /// The ledger belonging to working directory `dir`.
  pub fn in_dir(dir: impl AsRef<Path>) -> Self {
    Self::new(dir.as_ref().join(LEDGER_FILENAME))
  }

  /// The ledger of the process's current working directory.
  pub fn in_current_dir() -> Result<Self, LedgerError> {
    let cwd = std::env::current_dir().map_err(LedgerError::CurrentDir)?;
    Ok(Self::in_dir(cwd))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// The version last recorded for `name`.
  pub fn get(&self, name: &str) -> Result<Option<Version>, LedgerError> {
    let lines = self.read_lines()?;
    Ok(
      lines
        .iter()
        .filter_map(|line| parse_line(line))
        .filter(|(n, _)| *n == name)
        .map(|(_, v)| Version::new(v))
        .last(),
    )
  }

  /// All recorded `(name, version)` pairs in file order.
  pub fn entries(&self) -> Result<Vec<(String, Version)>, LedgerError> {
    let lines = self.read_lines()?;
    Ok(
      lines
        .iter()
        .filter_map(|line| parse_line(line))
        .map(|(n, v)| (n.to_string(), Version::new(v)))
        .collect(),
    )
  }

  /// Record that `version` of `name` was resolved.
  ///
  /// The ledger never moves backwards: if a higher version is already
  /// recorded, nothing is written. Returns whether the file changed.
  pub fn record(&self, name: &str, version: &Version) -> Result<bool, LedgerError> {
    let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

    let lines = self.read_lines()?;
    let previous = lines
      .iter()
      .filter_map(|line| parse_line(line))
      .filter(|(n, _)| *n == name)
      .map(|(_, v)| Version::new(v))
      .last();

    if let Some(previous) = &previous {
      if version < previous {
        debug!(name = %name, recorded = %previous, requested = %version, "ledger keeps newer version");
        return Ok(false);
      }
      if version == previous {
        return Ok(false);
      }
    }

    let mut content = String::new();
    for line in &lines {
      if parse_line(line).is_some_and(|(n, _)| n == name) {
        continue;
      }
      content.push_str(line);
      content.push('\n');
    }
    content.push_str(&format!("{}{}{}\n", name, SEPARATOR, version));

    write_atomic(&self.path, content.as_bytes()).map_err(|source| LedgerError::Write {
      path: self.path.clone(),
      source,
    })?;
    info!(name = %name, version = %version, ledger = ?self.path, "recorded resolved version");
    Ok(true)
  }

  fn read_lines(&self) -> Result<Vec<String>, LedgerError> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(LedgerError::Read {
          path: self.path.clone(),
          source,
        });
      }
    };

    let lines: Vec<String> = content
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(str::to_string)
      .collect();
    for line in &lines {
      if parse_line(line).is_none() {
        warn!(ledger = ?self.path, line = %line, "unparseable ledger line");
      }
    }
    Ok(lines)
  }
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
  let (name, version) = line.trim().split_once(SEPARATOR)?;
  let (name, version) = (name.trim(), version.trim());
  (!name.is_empty() && !version.is_empty()).then_some((name, version))
}
