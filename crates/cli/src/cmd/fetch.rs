//! Register an archive, downloaded from a URL or copied from a local file.

use std::path::Path;

use anyhow::Result;

use externa_lib::Version;
use externa_lib::config::Config;
use externa_lib::store::IngestOutcome;

use crate::output::{OutputFormat, print_info, print_json, print_success};

pub fn cmd_fetch(config: &Config, name: &str, version: &str, source: &str, output: OutputFormat) -> Result<()> {
  let store = config.open_store()?;
  let version = Version::from(version);

  let outcome = if source.starts_with("http://") || source.starts_with("https://") {
    store.fetch_url(name, &version, source)?
  } else {
    store.ingest(name, &version, Path::new(source))?
  };

  if output.is_json() {
    print_json(&serde_json::json!({
      "name": name,
      "version": version,
      "path": outcome.path(),
      "installed": matches!(outcome, IngestOutcome::Installed(_)),
    }))?;
    return Ok(());
  }

  match &outcome {
    IngestOutcome::Installed(path) => print_success(&format!("Stored {} {} at {}", name, version, path.display())),
    IngestOutcome::AlreadyPresent(path) => {
      print_info(&format!("Identical archive already present at {}", path.display()))
    }
  }
  Ok(())
}
