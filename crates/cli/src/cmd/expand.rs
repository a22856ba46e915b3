//! Implementation of the `mkfetch expand` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use mkfetch_lib::config::Config;
use mkfetch_lib::expand::IncludeExpander;

use crate::output::{OutputFormat, print_json};

/// Expand `reference` and return the generated top-level file.
pub(super) fn expand(config: Config, reference: &str, use_cache: bool) -> Result<PathBuf> {
  let generated_dir = config.generated_dir.clone();
  let resolver = super::resolver(config)?;
  let expander = IncludeExpander::new(&resolver, generated_dir);

  expander
    .expand(reference, use_cache)
    .with_context(|| format!("Failed to expand {}", reference))
}

pub fn cmd_expand(config: Config, reference: &str, use_cache: bool, output: OutputFormat) -> Result<()> {
  let path = expand(config, reference, use_cache)?;

  if output.is_json() {
    print_json(&serde_json::json!({ "reference": reference, "path": path }))?;
  } else {
    println!("{}", path.display());
  }

  Ok(())
}
