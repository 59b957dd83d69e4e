use std::time::Instant;

use anyhow::Result;

use externa_lib::Version;
use externa_lib::config::Config;
use externa_lib::store::UnpackOutcome;

use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};

pub fn cmd_unpack(config: &Config, name: &str, version: &str, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let store = config.open_store()?;
  let version = Version::from(version);

  let outcome = store.ensure_unpacked(name, &version)?;
  let path = store.unpacked_path(name, &version);

  if output.is_json() {
    print_json(&serde_json::json!({
      "name": name,
      "version": version,
      "path": path,
      "unpacked": outcome == UnpackOutcome::Unpacked,
    }))?;
    return Ok(());
  }

  match outcome {
    UnpackOutcome::Unpacked => print_success(&format!("Unpacked {} {}", name, version)),
    UnpackOutcome::AlreadyUnpacked => print_info(&format!("{} {} was already unpacked", name, version)),
  }
  print_stat("Path", &path.display().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));
  Ok(())
}
