//! Host identity and well-known directories.

pub mod paths;

/// Host identifier used when none is configured.
pub const FALLBACK_HOST: &str = "localhost";

/// The machine's hostname, made safe for use as a directory name.
///
/// Falls back to [`FALLBACK_HOST`] when the hostname cannot be determined.
pub fn hostname() -> String {
  let raw = whoami::fallible::hostname().unwrap_or_else(|_| FALLBACK_HOST.to_string());
  sanitize_host(&raw)
}

/// Replace path separators and other awkward characters in a host name.
///
/// Returns [`FALLBACK_HOST`] if nothing usable remains.
pub fn sanitize_host(raw: &str) -> String {
  let cleaned: String = raw
    .trim()
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
        c
      } else {
        '_'
      }
    })
    .collect();

  if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
    FALLBACK_HOST.to_string()
  } else {
    cleaned
  }
}
