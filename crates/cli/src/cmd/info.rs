use anyhow::Result;

use mkfetch_lib::config::Config;

use crate::output::{OutputFormat, print_info, print_json, print_stat};

pub fn cmd_info(config: &Config, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    return print_json(config);
  }

  print_info(&format!("mkfetch v{}", env!("CARGO_PKG_VERSION")));
  print_stat("Cache root", &config.cache_root.display().to_string());
  print_stat("Generated", &config.generated_dir.display().to_string());
  print_stat("Scratch", &config.scratch_dir.display().to_string());
  print_stat("Registry", &config.default_registry);
  print_stat("Insecure", &config.insecure.to_string());
  print_stat("HTTP timeout", &format!("{}s", config.http_timeout_secs));

  Ok(())
}
