//! Reference classification.
//!
//! Every reference string entering the system goes through [`classify`], which
//! decides whether it names a local file, an HTTP(S) URL or an OCI artifact and
//! normalizes it. Downstream code matches on [`Reference`] instead of
//! re-inspecting string prefixes.
//!
//! # Rules (in order)
//!
//! 1. `http://` / `https://` prefix: HTTP, used verbatim.
//! 2. `oci://` prefix, or no scheme and no existing local path: OCI. A missing
//!    registry gets the default registry, a missing tag gets `latest`.
//! 3. An existing local path: Local, made absolute.
//!
//! Any other `<scheme>://` is rejected as unsupported.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;
use url::Url;

use crate::consts::DEFAULT_TAG;
use crate::platform::paths::home_dir;
use crate::util::hash::ContentDigest;

const HTTP_PREFIX: &str = "http://";
const HTTPS_PREFIX: &str = "https://";
const OCI_PREFIX: &str = "oci://";
const SCHEME_SEPARATOR: &str = "://";

/// Errors that can occur while classifying a reference.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
  /// The reference uses a scheme no transport handles.
  #[error("unsupported reference '{reference}': scheme '{scheme}' is not one of http, https, oci")]
  Unsupported { reference: String, scheme: String },

  /// The reference is syntactically malformed.
  #[error("invalid reference '{reference}': {reason}")]
  Invalid { reference: String, reason: String },
}

impl ReferenceError {
  fn invalid(reference: &str, reason: impl Into<String>) -> Self {
    ReferenceError::Invalid {
      reference: reference.to_string(),
      reason: reason.into(),
    }
  }
}

/// The kind of a classified reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
  Local,
  Http,
  Oci,
}

/// A classified, normalized reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
  /// An existing file on the local filesystem (absolute path).
  Local(PathBuf),
  Http(HttpReference),
  Oci(OciReference),
}

impl Reference {
  pub fn kind(&self) -> Kind {
    match self {
      Reference::Local(_) => Kind::Local,
      Reference::Http(_) => Kind::Http,
      Reference::Oci(_) => Kind::Oci,
    }
  }

  pub fn is_remote(&self) -> bool {
    !matches!(self, Reference::Local(_))
  }
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Reference::Local(path) => write!(f, "{}", path.display()),
      Reference::Http(http) => write!(f, "{}", http),
      Reference::Oci(oci) => write!(f, "{}", oci),
    }
  }
}

/// An `http://` or `https://` URL, kept exactly as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReference {
  url: String,
  host: String,
}

impl HttpReference {
  pub fn parse(raw: &str) -> Result<Self, ReferenceError> {
    let parsed = Url::parse(raw).map_err(|e| ReferenceError::invalid(raw, e.to_string()))?;
    let host = parsed
      .host_str()
      .filter(|h| !h.is_empty())
      .ok_or_else(|| ReferenceError::invalid(raw, "URL has no host"))?;
    let host = match parsed.port() {
      Some(port) => format!("{}:{}", host, port),
      None => host.to_string(),
    };

    Ok(Self {
      url: raw.to_string(),
      host,
    })
  }

  /// The URL as originally given.
  pub fn url(&self) -> &str {
    &self.url
  }

  /// Host, including a non-default port.
  pub fn host(&self) -> &str {
    &self.host
  }
}

impl fmt::Display for HttpReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.url)
  }
}

/// What an OCI reference points at inside its repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OciTarget {
  Tag(String),
  Digest(ContentDigest),
}

impl OciTarget {
  /// The tag or the `sha256:<hex>` digest string.
  pub fn as_str(&self) -> &str {
    match self {
      OciTarget::Tag(tag) => tag,
      OciTarget::Digest(digest) => digest.as_str(),
    }
  }
}

/// A `registry/repository[:tag|@digest]` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
  pub registry: String,
  pub repository: String,
  pub target: OciTarget,
}

impl OciReference {
  /// Parse an OCI reference, with or without the `oci://` prefix.
  pub fn parse(raw: &str, default_registry: &str) -> Result<Self, ReferenceError> {
    let body = raw.strip_prefix(OCI_PREFIX).unwrap_or(raw);
    if body.is_empty() {
      return Err(ReferenceError::invalid(raw, "empty OCI reference"));
    }
    if body.chars().any(char::is_whitespace) {
      return Err(ReferenceError::invalid(raw, "OCI reference contains whitespace"));
    }

    let qualified;
    let body = if body.contains('/') {
      body
    } else {
      qualified = format!("{}/{}", default_registry, body);
      qualified.as_str()
    };

    let (registry, remainder) = body
      .split_once('/')
      .ok_or_else(|| ReferenceError::invalid(raw, "missing repository"))?;
    if matches!(registry, "" | "." | "..") {
      return Err(ReferenceError::invalid(raw, "missing registry"));
    }

    let (repository, target) = match remainder.split_once('@') {
      Some((repository, digest)) => {
        let digest = digest
          .parse::<ContentDigest>()
          .map_err(|e| ReferenceError::invalid(raw, e.to_string()))?;
        (repository, OciTarget::Digest(digest))
      }
      None => {
        let last_slash = remainder.rfind('/').map(|i| i + 1).unwrap_or(0);
        match remainder[last_slash..].rfind(':') {
          Some(colon) => {
            let split = last_slash + colon;
            let tag = &remainder[split + 1..];
            if tag.is_empty() {
              return Err(ReferenceError::invalid(raw, "empty tag"));
            }
            (&remainder[..split], OciTarget::Tag(tag.to_string()))
          }
          None => (remainder, OciTarget::Tag(DEFAULT_TAG.to_string())),
        }
      }
    };

    validate_repository(raw, repository)?;

    Ok(Self {
      registry: registry.to_string(),
      repository: repository.to_string(),
      target,
    })
  }

  pub fn tag(&self) -> Option<&str> {
    match &self.target {
      OciTarget::Tag(tag) => Some(tag),
      OciTarget::Digest(_) => None,
    }
  }

  pub fn digest(&self) -> Option<&ContentDigest> {
    match &self.target {
      OciTarget::Tag(_) => None,
      OciTarget::Digest(digest) => Some(digest),
    }
  }
}

impl fmt::Display for OciReference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sep = match self.target {
      OciTarget::Tag(_) => ':',
      OciTarget::Digest(_) => '@',
    };
    write!(
      f,
      "{}{}/{}{}{}",
      OCI_PREFIX,
      self.registry,
      self.repository,
      sep,
      self.target.as_str()
    )
  }
}

fn validate_repository(raw: &str, repository: &str) -> Result<(), ReferenceError> {
  if repository.is_empty() {
    return Err(ReferenceError::invalid(raw, "empty repository"));
  }
  for component in repository.split('/') {
    match component {
      "" => return Err(ReferenceError::invalid(raw, "empty repository path component")),
      "." | ".." => return Err(ReferenceError::invalid(raw, "relative repository path component")),
      _ => {}
    }
  }
  Ok(())
}

/// Classify and normalize a raw reference string.
///
/// # Arguments
///
/// * `raw` - The reference as written by the user or in an `include` line
/// * `default_registry` - Registry used for OCI references that name none
/// * `base_dir` - Directory that relative local paths are resolved against
///
/// # Errors
///
/// [`ReferenceError::Unsupported`] for unknown schemes such as `ftp://`;
/// [`ReferenceError::Invalid`] for malformed URLs and OCI references.
pub fn classify(raw: &str, default_registry: &str, base_dir: &Path) -> Result<Reference, ReferenceError> {
  let raw = raw.trim();
  if raw.is_empty() {
    return Err(ReferenceError::invalid(raw, "empty reference"));
  }

  if raw.starts_with(HTTP_PREFIX) || raw.starts_with(HTTPS_PREFIX) {
    return HttpReference::parse(raw).map(Reference::Http);
  }

  if raw.starts_with(OCI_PREFIX) {
    return OciReference::parse(raw, default_registry).map(Reference::Oci);
  }

  if let Some((scheme, _)) = raw.split_once(SCHEME_SEPARATOR) {
    return Err(ReferenceError::Unsupported {
      reference: raw.to_string(),
      scheme: scheme.to_string(),
    });
  }

  if let Some(path) = existing_local_path(raw, base_dir) {
    trace!(reference = raw, path = %path.display(), "classified as local");
    return Ok(Reference::Local(path));
  }

  OciReference::parse(raw, default_registry).map(Reference::Oci)
}

/// Resolve `raw` as a local path, returning its absolute form if it exists.
fn existing_local_path(raw: &str, base_dir: &Path) -> Option<PathBuf> {
  let expanded = if let Some(rest) = raw.strip_prefix("~/") {
    home_dir()?.join(rest)
  } else if raw == "~" {
    home_dir()?
  } else {
    let path = Path::new(raw);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      base_dir.join(path)
    }
  };

  dunce::canonicalize(&expanded).ok()
}
