use anyhow::{Result, bail};

use externa_lib::config::Config;

use crate::output::{OutputFormat, print_json, print_stat, print_success, print_warning, truncate_hash};

/// Compare every archive with its copies in peer stores. Fails if any differ.
pub fn cmd_audit(config: &Config, output: OutputFormat) -> Result<()> {
  let store = config.store();
  let discrepancies = store.audit()?;

  if output.is_json() {
    print_json(&discrepancies)?;
  } else if discrepancies.is_empty() {
    print_success(&format!(
      "All archives agree across {} store(s)",
      store.peers().len() + 1
    ));
  } else {
    for discrepancy in &discrepancies {
      print_warning(&format!("{} differs between stores", discrepancy.file_name));
      for (hash, paths) in &discrepancy.copies {
        for path in paths {
          print_stat(truncate_hash(hash.as_str()), &path.display().to_string());
        }
      }
    }
  }

  if !discrepancies.is_empty() {
    bail!("{} archive(s) differ between stores", discrepancies.len());
  }
  Ok(())
}
