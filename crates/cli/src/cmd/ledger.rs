use anyhow::Result;

use externa_lib::ledger::VersionLedger;

use crate::output::{OutputFormat, print_info, print_json, print_stat};

/// Show the versions recorded for the current directory.
pub fn cmd_ledger(output: OutputFormat) -> Result<()> {
  let ledger = VersionLedger::in_current_dir()?;
  let entries = ledger.entries()?;

  if output.is_json() {
    let map: serde_json::Map<String, serde_json::Value> = entries
      .iter()
      .map(|(name, version)| (name.clone(), serde_json::Value::String(version.to_string())))
      .collect();
    print_json(&map)?;
  } else if entries.is_empty() {
    print_info(&format!("No versions recorded in {}", ledger.path().display()));
  } else {
    for (name, version) in &entries {
      print_stat(name, version.as_str());
    }
  }
  Ok(())
}
