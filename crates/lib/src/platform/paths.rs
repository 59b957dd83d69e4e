use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Returns the user's home directory, if the environment names one.
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory, if the environment names one.
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> Option<PathBuf> {
  std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join(APP_NAME))
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> Option<PathBuf> {
  let data_home = match std::env::var_os("XDG_DATA_HOME").filter(|p| !p.is_empty()) {
    Some(path) => PathBuf::from(path),
    None => home_dir()?.join(".local").join("share"),
  };
  Some(data_home.join(APP_NAME))
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn xdg_data_home_takes_precedence() {
    temp_env::with_vars(
      [("XDG_DATA_HOME", Some("/custom/data")), ("HOME", Some("/home/user"))],
      || {
        assert_eq!(data_dir(), Some(PathBuf::from("/custom/data").join(APP_NAME)));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_fallback_to_home_directory() {
    temp_env::with_vars([("XDG_DATA_HOME", None::<&str>), ("HOME", Some("/home/user"))], || {
      assert_eq!(data_dir(), Some(PathBuf::from("/home/user/.local/share").join(APP_NAME)));
    });
  }

  #[test]
  #[serial]
  fn no_home_means_no_data_dir() {
    temp_env::with_vars([("XDG_DATA_HOME", None::<&str>), ("HOME", None::<&str>)], || {
      assert_eq!(home_dir(), None);
      assert_eq!(data_dir(), None);
    });
  }
}
