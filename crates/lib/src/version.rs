//! Version strings and their ordering.
//!
//! Versions are opaque strings. They are not required to follow semantic
//! versioning; instead they are ordered "naturally": a version is split into
//! runs of digits and runs of everything else, digit runs compare by numeric
//! value and the remaining runs compare character by character, with `.`
//! ranked after every letter and digit. This yields:
//!
//! ```text
//! 0.2 < 0.10
//! 1.2 < 1.2alpha < 1.2beta1 < 1.2rc1 < 1.2.1 < 1.3
//! ```
//!
//! Two versions that compare equal under the natural rules but differ as
//! strings (`1.01` and `1.1`) are ordered by plain string comparison, so the
//! order is strict and total and equality is string equality.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A version string with a natural total order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
  pub fn new(version: impl Into<String>) -> Self {
    Self(version.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for Version {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl From<String> for Version {
  fn from(value: String) -> Self {
    Self(value)
  }
}

impl From<&Version> for Version {
  fn from(value: &Version) -> Self {
    value.clone()
  }
}

impl AsRef<str> for Version {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl PartialEq<str> for Version {
  fn eq(&self, other: &str) -> bool {
    self.0 == other
  }
}

impl PartialEq<&str> for Version {
  fn eq(&self, other: &&str) -> bool {
    self.0 == *other
  }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering {
    compare_versions(&self.0, &other.0)
  }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Compare two version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
  natural_cmp(a, b).then_with(|| a.cmp(b))
}

/// Sort versions ascending in place.
pub fn sort_versions(versions: &mut [Version]) {
  versions.sort();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
  Number(&'a str),
  Text(&'a str),
}

fn segments(version: &str) -> Vec<Segment<'_>> {
  let mut result = Vec::new();
  let mut start = 0;
  let mut in_digits = None;

  for (idx, ch) in version.char_indices() {
    let is_digit = ch.is_ascii_digit();
    match in_digits {
      Some(prev) if prev != is_digit => {
        result.push(make_segment(&version[start..idx], prev));
        start = idx;
      }
      _ => {}
    }
    in_digits = Some(is_digit);
  }

  if let Some(prev) = in_digits {
    result.push(make_segment(&version[start..], prev));
  }

  result
}

fn make_segment(raw: &str, digits: bool) -> Segment<'_> {
  if digits { Segment::Number(raw) } else { Segment::Text(raw) }
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
  let left = segments(a);
  let right = segments(b);

  for (l, r) in left.iter().zip(right.iter()) {
    let ord = match (l, r) {
      (Segment::Number(x), Segment::Number(y)) => compare_numeric(x, y),
      (Segment::Text(x), Segment::Text(y)) => compare_text(x, y),
      (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
      (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
    };
    if ord != Ordering::Equal {
      return ord;
    }
  }

  left.len().cmp(&right.len())
}

/// Digit runs of any length; leading zeros are ignored.
fn compare_numeric(a: &str, b: &str) -> Ordering {
  let a = a.trim_start_matches('0');
  let b = b.trim_start_matches('0');
  a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_text(a: &str, b: &str) -> Ordering {
  a.chars().map(text_rank).cmp(b.chars().map(text_rank))
}

// '.' sorts like '~', after letters and digits, so "1.2rc1" < "1.2.1".
fn text_rank(ch: char) -> char {
  if ch == '.' { '~' } else { ch }
}

/// A half-open version interval `[minimum, maximum)`; either bound may be open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRange {
  pub minimum: Option<Version>,
  pub maximum: Option<Version>,
}

impl VersionRange {
  pub fn new(minimum: Option<Version>, maximum: Option<Version>) -> Self {
    Self { minimum, maximum }
  }

  pub fn contains(&self, version: &Version) -> bool {
    let above_min = self.minimum.as_ref().is_none_or(|min| version >= min);
    let below_max = self.maximum.as_ref().is_none_or(|max| version < max);
    above_min && below_max
  }
}

/// The caller-facing way of asking for an algorithm version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
  /// The highest version present in the store (fetching once if none is).
  Latest,
  /// Whatever the working directory's ledger recorded last, else `Latest`.
  LastUsed,
  /// Exactly this version.
  Exact(Version),
}

impl VersionRequest {
  pub const LATEST: &'static str = "_latest";
  pub const LAST_USED: &'static str = "_last_used";
}

impl FromStr for VersionRequest {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      Self::LATEST | "latest" => VersionRequest::Latest,
      Self::LAST_USED => VersionRequest::LastUsed,
      other => VersionRequest::Exact(Version::new(other)),
    })
  }
}

impl From<&str> for VersionRequest {
  fn from(value: &str) -> Self {
    match value.parse() {
      Ok(request) => request,
      Err(never) => match never {},
    }
  }
}

impl From<Version> for VersionRequest {
  fn from(value: Version) -> Self {
    VersionRequest::Exact(value)
  }
}

impl fmt::Display for VersionRequest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VersionRequest::Latest => f.write_str(Self::LATEST),
      VersionRequest::LastUsed => f.write_str(Self::LAST_USED),
      VersionRequest::Exact(v) => write!(f, "{}", v),
    }
  }
}
