//! Implementation of the `mkfetch cache` subcommands.

use std::path::Path;

use anyhow::{Context, Result};

use mkfetch_lib::cache::ContentCache;
use mkfetch_lib::config::Config;
use mkfetch_lib::util::hash::ContentDigest;

use crate::output::{
  OutputFormat, format_bytes, print_info, print_json, print_stat, print_success, print_warning, symbols,
  truncate_digest,
};

/// Store the contents of `file` in the cache under `reference`.
///
/// Resolving the same reference afterwards is a cache hit and needs no network.
pub fn cmd_cache_push(config: Config, file: &Path, reference: &str, output: OutputFormat) -> Result<()> {
  let data = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
  let digest = ContentDigest::of(&data);

  let resolver = super::resolver(config)?;
  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  let classified = resolver.classify(reference, &cwd)?;
  let blob = resolver
    .push(&classified, &data)
    .with_context(|| format!("Failed to cache {}", file.display()))?;

  if output.is_json() {
    print_json(&serde_json::json!({
      "reference": classified.to_string(),
      "digest": digest,
      "path": blob,
      "size": data.len(),
    }))?;
  } else {
    print_success(&format!("Cached {}", classified));
    print_stat("Digest", truncate_digest(digest.as_str()));
    print_stat("Size", &format_bytes(data.len() as u64));
    print_stat("Blob", &blob.display().to_string());
  }

  Ok(())
}

/// List every ref in the cache.
pub fn cmd_cache_list(config: Config, output: OutputFormat) -> Result<()> {
  let cache = ContentCache::new(&config.cache_root);
  let entries = cache.list().context("Failed to list cache")?;

  if output.is_json() {
    return print_json(&entries);
  }

  if entries.is_empty() {
    print_info(&format!("No cached artifacts in {}", cache.root().display()));
    return Ok(());
  }

  for entry in &entries {
    let target = entry
      .digest
      .as_ref()
      .map(|d| truncate_digest(d.as_str()).to_string())
      .unwrap_or_else(|| entry.target.display().to_string());
    println!(
      "  {} {}:{} {} {}",
      symbols::INFO,
      entry.scope,
      entry.reference,
      symbols::ARROW,
      target
    );
  }

  let dangling = entries.iter().filter(|e| e.dangling).count();
  println!();
  print_stat("Refs", &entries.len().to_string());
  if dangling > 0 {
    print_warning(&format!("{} ref(s) point at missing blobs and will be refetched", dangling));
  }

  Ok(())
}
