mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mkfetch_lib::config::Config;

use crate::output::{OutputFormat, print_error};

/// Environment variables holding the log filter, checked in order.
const LOG_ENV: [&str; 2] = ["MKFETCH_LOG", "RUST_LOG"];

/// mkfetch - resolve, cache and run remote Makefiles
#[derive(Parser)]
#[command(name = "mkfetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  /// Cache root (overrides MKFETCH_CACHE_DIR)
  #[arg(long, global = true, value_name = "DIR")]
  cache_dir: Option<PathBuf>,

  /// Where expanded Makefiles are written (overrides MKFETCH_GENERATED_DIR)
  #[arg(long, global = true, value_name = "DIR")]
  generated_dir: Option<PathBuf>,

  /// Registry for OCI references that name none (overrides MKFETCH_DEFAULT_REGISTRY)
  #[arg(long, global = true, value_name = "HOST")]
  registry: Option<String>,

  /// Skip cache write-back and talk plain HTTP to registries
  #[arg(long, global = true)]
  insecure: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve a reference to a local file and print its path
  Resolve {
    /// Local path, http(s) URL, or OCI reference
    reference: String,

    /// Bypass the cache for reads and writes
    #[arg(long)]
    no_cache: bool,
  },

  /// Resolve a Makefile and flatten its includes into generated files
  Expand {
    /// Local path, http(s) URL, or OCI reference
    reference: String,

    /// Bypass the cache for reads and writes
    #[arg(long)]
    no_cache: bool,
  },

  /// Expand a Makefile and run make on the result
  Run {
    /// Local path, http(s) URL, or OCI reference
    reference: String,

    /// Bypass the cache for reads and writes
    #[arg(long)]
    no_cache: bool,

    /// Arguments passed to make
    #[arg(last = true)]
    make_args: Vec<String>,
  },

  /// Inspect and seed the artifact cache
  #[command(subcommand)]
  Cache(CacheCommands),

  /// Show the effective configuration
  Info,
}

#[derive(Subcommand)]
enum CacheCommands {
  /// Store a local file under an OCI or HTTP reference
  Push {
    /// File to store
    file: PathBuf,

    /// OCI or HTTP reference to store it under
    reference: String,
  },

  /// List cached refs
  List,
}

impl Cli {
  fn config(&self) -> Config {
    let mut config = Config::from_env_with_cache_root(self.cache_dir.clone());
    if let Some(dir) = &self.generated_dir {
      config = config.with_generated_dir(dir.clone());
    }
    if let Some(registry) = &self.registry {
      config = config.with_default_registry(registry.clone());
    }
    if self.insecure {
      config = config.with_insecure(true);
    }
    config
  }
}

fn init_logging(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    LOG_ENV
      .iter()
      .find_map(|var| EnvFilter::try_from_env(var).ok())
      .unwrap_or_else(|| EnvFilter::new("warn"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let config = cli.config();
  let output = cli.output;

  let result = match cli.command {
    Commands::Resolve { reference, no_cache } => cmd::cmd_resolve(config, &reference, !no_cache, output),
    Commands::Expand { reference, no_cache } => cmd::cmd_expand(config, &reference, !no_cache, output),
    Commands::Run {
      reference,
      no_cache,
      make_args,
    } => cmd::cmd_run(config, &reference, !no_cache, &make_args).map(|code| {
      if code != 0 {
        std::process::exit(code);
      }
    }),
    Commands::Cache(CacheCommands::Push { file, reference }) => cmd::cmd_cache_push(config, &file, &reference, output),
    Commands::Cache(CacheCommands::List) => cmd::cmd_cache_list(config, output),
    Commands::Info => cmd::cmd_info(&config, output),
  };

  if let Err(e) = result {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}
