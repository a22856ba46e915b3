//! Cache scopes: the directory namespace one artifact family lives under.
//!
//! ```text
//! <registry>/<repository...>            # OCI
//! http/<host>/<url-escaped-reference>   # HTTP
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::CacheError;
use crate::consts::HTTP_SCOPE_DIR;

/// Bytes kept verbatim when escaping a URL into a single path segment.
///
/// Everything else, including `/`, `?`, `#`, `,` and `;`, is percent-encoded.
const URL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'.')
  .remove(b'_')
  .remove(b'~')
  .remove(b'$')
  .remove(b'&')
  .remove(b'+')
  .remove(b':')
  .remove(b'=')
  .remove(b'@');

/// A validated, relative cache namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
  components: Vec<String>,
}

impl Scope {
  /// Scope for an OCI repository: `<registry>/<repository>`.
  pub fn oci(registry: &str, repository: &str) -> Result<Self, CacheError> {
    let reference = format!("{}/{}", registry, repository);
    let mut components = vec![registry.to_string()];
    components.extend(repository.split('/').map(str::to_string));
    Self::from_components(&reference, components)
  }

  /// Scope for an HTTP artifact: `http/<host>/<escaped-url>`.
  pub fn http(host: &str, url: &str) -> Result<Self, CacheError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
      return Err(CacheError::invalid(url, "HTTP scope requires an http:// or https:// URL"));
    }
    let components = vec![HTTP_SCOPE_DIR.to_string(), host.to_string(), escape_url(url)];
    Self::from_components(url, components)
  }

  fn from_components(reference: &str, components: Vec<String>) -> Result<Self, CacheError> {
    for component in &components {
      validate_component(reference, component)?;
    }
    Ok(Self { components })
  }

  /// Path of the scope relative to the cache root.
  pub fn relative_path(&self) -> PathBuf {
    self.components.iter().collect()
  }
}

impl FromStr for Scope {
  type Err = CacheError;

  /// Parse a `/`-separated scope such as `example.com/repo`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.is_empty() {
      return Err(CacheError::invalid(s, "empty scope"));
    }
    let components = s.split('/').map(str::to_string).collect();
    Self::from_components(s, components)
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.components.join("/"))
  }
}

/// Escape a full URL into one path segment.
pub fn escape_url(url: &str) -> String {
  utf8_percent_encode(url, URL_SEGMENT).to_string()
}

/// Reject names that could escape the cache root or carry a foreign scheme.
pub(super) fn validate_component(reference: &str, component: &str) -> Result<(), CacheError> {
  if component.contains("://") {
    return Err(CacheError::invalid(reference, "unexpected scheme in cache path"));
  }
  match component {
    "" => Err(CacheError::invalid(reference, "empty path component")),
    "." | ".." => Err(CacheError::invalid(reference, "relative path component")),
    _ if component.contains(['/', '\\', '\0']) => Err(CacheError::invalid(reference, "path separator in name")),
    _ => Ok(()),
  }
}
