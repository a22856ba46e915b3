//! Artifact resolution.
//!
//! The resolver turns any reference into a local file path:
//!
//! 1. Classify the reference
//! 2. Local: verify the file exists and return it
//! 3. Remote, cache enabled: return the cached blob on a hit
//! 4. Otherwise fetch through the matching transport
//! 5. Write the bytes back into the cache, or into a throwaway file when the
//!    cache is bypassed or write-back is disabled (`insecure`)
//!
//! Cache misses are expected and only logged at debug level. Nothing is
//! retried: a failed fetch is reported once.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheError, ContentCache, Scope};
use crate::config::Config;
use crate::consts::HTTP_REF;
use crate::reference::{HttpReference, OciReference, Reference, ReferenceError, classify};
use crate::transport::{HttpTransport, OciTransport, Transport, TransportError};

/// Errors that can occur while resolving a reference.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The reference could not be classified.
  #[error(transparent)]
  Reference(#[from] ReferenceError),

  /// A local reference does not name an existing file.
  #[error("source not found: {}", .0.display())]
  SourceNotFound(PathBuf),

  /// Only remote references have a place in the cache.
  #[error("local path '{}' cannot be stored in the cache", .0.display())]
  NotCacheable(PathBuf),

  /// The remote fetch failed.
  #[error("failed to fetch '{reference}': {source}")]
  Fetch {
    reference: String,
    #[source]
    source: TransportError,
  },

  /// Writing the fetched artifact into the cache failed.
  #[error("failed to cache '{reference}': {source}")]
  Cache {
    reference: String,
    #[source]
    source: CacheError,
  },

  /// Writing the uncached copy failed.
  #[error("failed to write temporary copy of '{reference}': {source}")]
  TempFile {
    reference: String,
    #[source]
    source: std::io::Error,
  },
}

type BoxedTransport<R> = Box<dyn Transport<R>>;

/// Resolves references to local files through the cache and transports.
pub struct ArtifactResolver {
  config: Config,
  cache: ContentCache,
  http: BoxedTransport<HttpReference>,
  oci: BoxedTransport<OciReference>,
}

impl ArtifactResolver {
  /// Build a resolver with explicit transports.
  pub fn new(
    config: Config,
    http: impl Transport<HttpReference> + 'static,
    oci: impl Transport<OciReference> + 'static,
  ) -> Self {
    let cache = ContentCache::new(config.cache_root.clone());
    Self {
      config,
      cache,
      http: Box::new(http),
      oci: Box::new(oci),
    }
  }

  /// Build a resolver with the network transports described by `config`.
  pub fn with_default_transports(config: Config) -> Result<Self, TransportError> {
    let http = HttpTransport::new(config.http_timeout())?;
    let mut oci = OciTransport::new(config.insecure)?;
    if let Some(credentials) = &config.registry_credentials {
      oci = oci.with_basic_auth(credentials.username.clone(), credentials.password.clone());
    }
    Ok(Self::new(config, http, oci))
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn cache(&self) -> &ContentCache {
    &self.cache
  }

  /// Classify `raw` with relative local paths resolved against `base_dir`.
  pub fn classify(&self, raw: &str, base_dir: &Path) -> Result<Reference, ReferenceError> {
    classify(raw, &self.config.default_registry, base_dir)
  }

  /// Resolve a reference relative to the current directory.
  pub fn resolve(&self, raw: &str, use_cache: bool) -> Result<PathBuf, ResolveError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    self.resolve_from(raw, &cwd, use_cache)
  }

  /// Resolve a reference whose relative local paths are relative to `base_dir`.
  pub fn resolve_from(&self, raw: &str, base_dir: &Path, use_cache: bool) -> Result<PathBuf, ResolveError> {
    let reference = self.classify(raw, base_dir)?;
    debug!(raw, reference = %reference, "classified reference");
    self.resolve_reference(&reference, use_cache)
  }

  /// Resolve an already classified reference.
  pub fn resolve_reference(&self, reference: &Reference, use_cache: bool) -> Result<PathBuf, ResolveError> {
    let (scope, tag) = match reference {
      Reference::Local(path) => {
        return if path.is_file() {
          Ok(path.clone())
        } else {
          Err(ResolveError::SourceNotFound(path.clone()))
        };
      }
      remote => cache_slot(remote)?,
    };

    if use_cache {
      match self.cache.pull(&scope, tag) {
        Ok(path) => {
          debug!(reference = %reference, path = %path.display(), "cache hit");
          return Ok(path);
        }
        Err(e) if e.is_miss() => debug!(reference = %reference, "cache miss"),
        Err(source) => {
          return Err(ResolveError::Cache {
            reference: reference.to_string(),
            source,
          });
        }
      }
    }

    let data = self.fetch(reference)?;

    if use_cache && !self.config.insecure {
      let path = self.cache.push(&scope, tag, &data).map_err(|source| ResolveError::Cache {
        reference: reference.to_string(),
        source,
      })?;
      info!(reference = %reference, path = %path.display(), "cached artifact");
      return Ok(path);
    }

    self.write_uncached(reference, &data)
  }

  /// Store `data` in the cache under a remote reference, as a fetch would.
  ///
  /// Local references have no cache slot and fail with
  /// [`ResolveError::NotCacheable`].
  pub fn push(&self, reference: &Reference, data: &[u8]) -> Result<PathBuf, ResolveError> {
    let (scope, tag) = cache_slot(reference)?;
    let path = self.cache.push(&scope, tag, data).map_err(|source| ResolveError::Cache {
      reference: reference.to_string(),
      source,
    })?;
    info!(reference = %reference, path = %path.display(), "pushed artifact");
    Ok(path)
  }

  fn fetch(&self, reference: &Reference) -> Result<Vec<u8>, ResolveError> {
    let result = match reference {
      Reference::Http(http) => self.http.fetch(http),
      Reference::Oci(oci) => self.oci.fetch(oci),
      Reference::Local(path) => return Err(ResolveError::SourceNotFound(path.clone())),
    };
    result.map_err(|source| ResolveError::Fetch {
      reference: reference.to_string(),
      source,
    })
  }

  /// Write `data` to a file in the scratch directory that outlives this call.
  fn write_uncached(&self, reference: &Reference, data: &[u8]) -> Result<PathBuf, ResolveError> {
    let temp_error = |source| ResolveError::TempFile {
      reference: reference.to_string(),
      source,
    };

    std::fs::create_dir_all(&self.config.scratch_dir).map_err(temp_error)?;
    let mut file = tempfile::Builder::new()
      .prefix("mkfetch-")
      .suffix(".mk")
      .tempfile_in(&self.config.scratch_dir)
      .map_err(temp_error)?;
    file.write_all(data).and_then(|()| file.flush()).map_err(temp_error)?;

    let (_, path) = file.keep().map_err(|e| temp_error(e.error))?;
    debug!(reference = %reference, path = %path.display(), "wrote uncached copy");
    Ok(path)
  }
}

/// Cache scope and ref name of a remote reference.
fn cache_slot(reference: &Reference) -> Result<(Scope, &str), ResolveError> {
  let slot = match reference {
    Reference::Http(http) => Scope::http(http.host(), http.url()).map(|scope| (scope, HTTP_REF)),
    Reference::Oci(oci) => Scope::oci(&oci.registry, &oci.repository).map(|scope| (scope, oci.target.as_str())),
    Reference::Local(path) => return Err(ResolveError::NotCacheable(path.clone())),
  };
  slot.map_err(|source| ResolveError::Cache {
    reference: reference.to_string(),
    source,
  })
}
