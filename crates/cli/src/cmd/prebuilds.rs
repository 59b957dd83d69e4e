use anyhow::Result;

use externa_lib::config::Config;

use crate::output::{OutputFormat, format_timestamp, print_info, print_json, print_stat};

pub fn cmd_prebuilds(config: &Config, name: &str, output: OutputFormat) -> Result<()> {
  let manager = config.prebuild_manager()?;
  let artifacts = manager.artifacts(name)?;

  if output.is_json() {
    print_json(&artifacts)?;
    return Ok(());
  }

  if artifacts.is_empty() {
    print_info(&format!("No prebuilds of {} under {}", name, manager.root().display()));
    return Ok(());
  }
  for artifact in &artifacts {
    let status = match artifact.completed_at {
      Some(at) => format!("complete {}", format_timestamp(at)),
      None => "incomplete".to_string(),
    };
    print_stat(
      &format!("{} @ {}", artifact.version, artifact.host),
      &format!("{} ({})", artifact.path.display(), status),
    );
  }
  Ok(())
}
