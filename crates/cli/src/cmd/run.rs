//! Implementation of the `mkfetch run` command.
//!
//! Expands the Makefile, then hands the generated file to `make -f`. The make
//! binary can be replaced through `MKFETCH_MAKE`.

use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, info};

use mkfetch_lib::config::Config;

const MAKE_ENV: &str = "MKFETCH_MAKE";
const DEFAULT_MAKE: &str = "make";

/// Run make on the expanded `reference` and return its exit code.
pub fn cmd_run(config: Config, reference: &str, use_cache: bool, make_args: &[String]) -> Result<i32> {
  let makefile = super::expand::expand(config, reference, use_cache)?;

  let make = std::env::var(MAKE_ENV)
    .ok()
    .filter(|m| !m.trim().is_empty())
    .unwrap_or_else(|| DEFAULT_MAKE.to_string());

  info!(make = %make, makefile = %makefile.display(), args = ?make_args, "running make");

  let status = Command::new(&make)
    .arg("-f")
    .arg(&makefile)
    .args(make_args)
    .status()
    .with_context(|| format!("Failed to run {}", make))?;

  debug!(%status, "make finished");

  // Killed by a signal: no code to forward.
  Ok(status.code().unwrap_or(1))
}
