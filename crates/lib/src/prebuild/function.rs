//! Build functions and their identities.
//!
//! An artifact remembers the identity of the function that built it. Reusing
//! an older version is only allowed when the identity still matches, and an
//! exact version whose function changed is refused.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::util::hash::hash_bytes;

pub type BuildResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Stable fingerprint of a build function's behavior.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionIdentity(String);

impl FunctionIdentity {
  /// Identity from a caller-chosen tag. Change the tag whenever the
  /// function's output would change.
  pub fn from_tag(tag: &str) -> Self {
    Self(hash_bytes(format!("tag:{tag}").as_bytes()).0)
  }

  /// Identity from the function's source text.
  pub fn from_source(source: &str) -> Self {
    Self(hash_bytes(format!("source:{source}").as_bytes()).0)
  }

  /// Wrap an identity read back from disk.
  pub fn from_stored(stored: &str) -> Self {
    Self(stored.trim().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for FunctionIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Produces an artifact's outputs inside the given directory.
pub trait BuildFunction: Send + Sync {
  fn identity(&self) -> FunctionIdentity;

  fn build(&self, output_dir: &Path) -> BuildResult;
}

struct ClosureFunction<F> {
  identity: FunctionIdentity,
  build: F,
}

impl<F> BuildFunction for ClosureFunction<F>
where
  F: Fn(&Path) -> BuildResult + Send + Sync,
{
  fn identity(&self) -> FunctionIdentity {
    self.identity.clone()
  }

  fn build(&self, output_dir: &Path) -> BuildResult {
    (self.build)(output_dir)
  }
}

/// A build function from a closure, identified by `tag`.
pub fn build_fn<F>(tag: &str, build: F) -> Arc<dyn BuildFunction>
where
  F: Fn(&Path) -> BuildResult + Send + Sync + 'static,
{
  Arc::new(ClosureFunction {
    identity: FunctionIdentity::from_tag(tag),
    build,
  })
}
