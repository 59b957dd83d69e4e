//! List archive names, or the versions of one name.

use anyhow::Result;
use serde::Serialize;

use externa_lib::config::Config;

use crate::output::{OutputFormat, format_bytes, print_info, print_json, print_stat};

#[derive(Serialize)]
struct VersionEntry {
  version: String,
  unpacked: bool,
  size_bytes: Option<u64>,
}

pub fn cmd_versions(config: &Config, name: Option<&str>, output: OutputFormat) -> Result<()> {
  let store = config.store();

  let Some(name) = name else {
    let names = store.list_names()?;
    if output.is_json() {
      print_json(&names)?;
    } else if names.is_empty() {
      print_info(&format!("No archives in {}", store.archive_dir().display()));
    } else {
      for name in names {
        println!("{}", name);
      }
    }
    return Ok(());
  };

  let entries: Vec<VersionEntry> = store
    .list_versions(name)?
    .into_iter()
    .map(|version| VersionEntry {
      unpacked: store.is_unpacked(name, &version),
      size_bytes: std::fs::metadata(store.archive_path(name, &version)).ok().map(|m| m.len()),
      version: version.to_string(),
    })
    .collect();

  if output.is_json() {
    print_json(&entries)?;
    return Ok(());
  }

  if entries.is_empty() {
    print_info(&format!("No versions of {} in the store", name));
    return Ok(());
  }
  for entry in &entries {
    let mut details = Vec::new();
    if let Some(size) = entry.size_bytes {
      details.push(format_bytes(size));
    }
    if entry.unpacked {
      details.push("unpacked".to_string());
    }
    print_stat(&entry.version, &details.join(", "));
  }
  Ok(())
}
