//! Resolver configuration.
//!
//! Every component receives a [`Config`] value at construction; nothing reads
//! ambient state after that. [`Config::from_env`] builds one from environment
//! variables layered over XDG defaults.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::consts::{DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_REGISTRY};
use crate::platform::paths::cache_dir;

pub const CACHE_DIR_ENV: &str = "MKFETCH_CACHE_DIR";
pub const GENERATED_DIR_ENV: &str = "MKFETCH_GENERATED_DIR";
pub const DEFAULT_REGISTRY_ENV: &str = "MKFETCH_DEFAULT_REGISTRY";
pub const INSECURE_ENV: &str = "MKFETCH_INSECURE";
pub const HTTP_TIMEOUT_ENV: &str = "MKFETCH_HTTP_TIMEOUT_SECS";
pub const REGISTRY_USERNAME_ENV: &str = "MKFETCH_REGISTRY_USERNAME";
pub const REGISTRY_PASSWORD_ENV: &str = "MKFETCH_REGISTRY_PASSWORD";

/// Basic credentials for OCI registries. Never serialized or logged.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
  pub username: String,
  pub password: String,
}

impl fmt::Debug for RegistryCredentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RegistryCredentials")
      .field("username", &self.username)
      .field("password", &"<redacted>")
      .finish()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
  /// Root of the content-addressed artifact cache.
  pub cache_root: PathBuf,

  /// Where the include expander writes flattened files.
  pub generated_dir: PathBuf,

  /// Where uncached fetches are written. Never inside `cache_root`.
  pub scratch_dir: PathBuf,

  /// Registry prepended to OCI references that name none.
  pub default_registry: String,

  /// Skip cache write-back after a fetch, and talk plain HTTP to registries.
  pub insecure: bool,

  pub http_timeout_secs: u64,

  /// Sent to every registry; anonymous when unset.
  #[serde(skip)]
  pub registry_credentials: Option<RegistryCredentials>,
}

impl Config {
  /// Configuration rooted at `cache_root`, with the generated directory next to it.
  pub fn new(cache_root: impl Into<PathBuf>) -> Self {
    let cache_root = cache_root.into();
    let generated_dir = generated_dir_for(&cache_root);
    Self {
      cache_root,
      generated_dir,
      scratch_dir: std::env::temp_dir(),
      default_registry: DEFAULT_REGISTRY.to_string(),
      insecure: false,
      http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
      registry_credentials: None,
    }
  }

  /// Build the configuration from `MKFETCH_*` environment variables.
  pub fn from_env() -> Self {
    Self::from_env_with_cache_root(None)
  }

  /// Like [`Config::from_env`], but an explicit `cache_root` wins over
  /// `MKFETCH_CACHE_DIR`. The generated directory still follows the chosen
  /// root unless `MKFETCH_GENERATED_DIR` is set.
  pub fn from_env_with_cache_root(cache_root: Option<PathBuf>) -> Self {
    let cache_root = cache_root
      .or_else(|| std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from))
      .unwrap_or_else(Self::default_cache_root);

    let mut config = Self::new(cache_root);

    if let Some(dir) = std::env::var_os(GENERATED_DIR_ENV) {
      config.generated_dir = PathBuf::from(dir);
    }
    if let Ok(registry) = std::env::var(DEFAULT_REGISTRY_ENV)
      && !registry.trim().is_empty()
    {
      config.default_registry = registry.trim().to_string();
    }
    if let Ok(value) = std::env::var(INSECURE_ENV) {
      config.insecure = parse_flag(&value);
    }
    if let Some(secs) = std::env::var(HTTP_TIMEOUT_ENV).ok().and_then(|v| v.trim().parse().ok()) {
      config.http_timeout_secs = secs;
    }
    if let (Ok(username), Ok(password)) = (std::env::var(REGISTRY_USERNAME_ENV), std::env::var(REGISTRY_PASSWORD_ENV))
      && !username.is_empty()
    {
      config.registry_credentials = Some(RegistryCredentials { username, password });
    }

    config
  }

  pub fn default_cache_root() -> PathBuf {
    cache_dir().join("artifacts")
  }

  pub fn with_default_registry(mut self, registry: impl Into<String>) -> Self {
    self.default_registry = registry.into();
    self
  }

  pub fn with_insecure(mut self, insecure: bool) -> Self {
    self.insecure = insecure;
    self
  }

  pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.scratch_dir = dir.into();
    self
  }

  pub fn with_generated_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.generated_dir = dir.into();
    self
  }

  pub fn with_registry_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
    self.registry_credentials = Some(RegistryCredentials {
      username: username.into(),
      password: password.into(),
    });
    self
  }

  pub fn http_timeout(&self) -> Duration {
    Duration::from_secs(self.http_timeout_secs)
  }
}

/// Sibling `generated` directory of the cache root.
fn generated_dir_for(cache_root: &std::path::Path) -> PathBuf {
  match cache_root.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.join("generated"),
    _ => cache_root.join("generated"),
  }
}

fn parse_flag(value: &str) -> bool {
  matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
