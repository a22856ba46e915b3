mod cache;
mod expand;
mod info;
mod resolve;
mod run;

pub use cache::{cmd_cache_list, cmd_cache_push};
pub use expand::cmd_expand;
pub use info::cmd_info;
pub use resolve::cmd_resolve;
pub use run::cmd_run;

use anyhow::{Context, Result};

use mkfetch_lib::config::Config;
use mkfetch_lib::resolve::ArtifactResolver;

/// Build a resolver with the network transports.
fn resolver(config: Config) -> Result<ArtifactResolver> {
  ArtifactResolver::with_default_transports(config).context("Failed to initialize transports")
}
