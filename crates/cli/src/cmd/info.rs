use anyhow::Result;

use externa_lib::config::Config;

use crate::output::{OutputFormat, print_json, print_stat};

pub fn cmd_info(config: &Config, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    print_json(&serde_json::json!({
      "host": config.host,
      "archive_dir": config.archive_dir(),
      "unpack_dir": config.unpack_dir(),
      "archive_extension": config.archive_extension,
      "peers": config.peers,
      "prebuild_root": config.prebuild_root,
    }))?;
    return Ok(());
  }

  println!("Configuration:");
  print_stat("Host", &config.host);
  print_stat("Archives", &config.archive_dir().display().to_string());
  print_stat("Unpacked", &config.unpack_dir().display().to_string());
  print_stat("Extension", &config.archive_extension);
  for peer in &config.peers {
    print_stat("Peer", &peer.display().to_string());
  }
  match &config.prebuild_root {
    Some(root) => print_stat("Prebuilds", &root.display().to_string()),
    None => print_stat("Prebuilds", "not configured"),
  }
  Ok(())
}
