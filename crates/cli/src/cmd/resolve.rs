//! Implementation of the `mkfetch resolve` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use mkfetch_lib::config::Config;
use mkfetch_lib::reference::Kind;

use crate::output::{OutputFormat, print_json};

#[derive(Serialize)]
struct ResolveOutput<'a> {
  reference: String,
  kind: &'static str,
  path: &'a Path,
}

/// Resolve `reference` and print the local path.
///
/// Remote references are served from the cache when possible; with
/// `use_cache` false the cache is neither read nor written.
pub fn cmd_resolve(config: Config, reference: &str, use_cache: bool, output: OutputFormat) -> Result<()> {
  let resolver = super::resolver(config)?;
  let cwd = std::env::current_dir().context("Failed to read current directory")?;

  let classified = resolver.classify(reference, &cwd)?;
  let path = resolver
    .resolve_reference(&classified, use_cache)
    .with_context(|| format!("Failed to resolve {}", reference))?;

  if output.is_json() {
    let kind = match classified.kind() {
      Kind::Local => "local",
      Kind::Http => "http",
      Kind::Oci => "oci",
    };
    print_json(&ResolveOutput {
      reference: classified.to_string(),
      kind,
      path: &path,
    })?;
  } else {
    println!("{}", path.display());
  }

  Ok(())
}
