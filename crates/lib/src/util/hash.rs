//! Content digests for the artifact cache.
//!
//! A [`ContentDigest`] is the `sha256:<hex>` identity of a blob. Blob filenames
//! are always the digest of their contents, so a cache path is self-verifying.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Algorithm prefix of every digest string.
pub const SHA256_PREFIX: &str = "sha256:";

const SHA256_HEX_LEN: usize = 64;

/// A `sha256:<hex>` content digest.
///
/// # Format
///
/// `sha256:` followed by 64 lowercase hexadecimal characters, e.g.
/// `sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid digest '{0}': expected sha256:<64 lowercase hex characters>")]
pub struct DigestParseError(pub String);

impl ContentDigest {
  /// Digest of an in-memory byte slice.
  pub fn of(data: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Self(format!("{}{}", SHA256_PREFIX, hex::encode(hasher.finalize())))
  }

  /// Digest of a file's contents, read in chunks.
  pub fn of_file(path: &Path) -> std::io::Result<Self> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
      let bytes_read = file.read(&mut buffer)?;
      if bytes_read == 0 {
        break;
      }
      hasher.update(&buffer[..bytes_read]);
    }

    Ok(Self(format!("{}{}", SHA256_PREFIX, hex::encode(hasher.finalize()))))
  }

  /// The full `sha256:<hex>` string.
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The hex part without the algorithm prefix.
  pub fn hex(&self) -> &str {
    &self.0[SHA256_PREFIX.len()..]
  }

  /// Whether `value` is syntactically a digest string.
  pub fn is_digest(value: &str) -> bool {
    value
      .strip_prefix(SHA256_PREFIX)
      .is_some_and(|hex| hex.len() == SHA256_HEX_LEN && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
  }
}

impl FromStr for ContentDigest {
  type Err = DigestParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if Self::is_digest(s) {
      Ok(Self(s.to_string()))
    } else {
      Err(DigestParseError(s.to_string()))
    }
  }
}

impl TryFrom<String> for ContentDigest {
  type Error = DigestParseError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<ContentDigest> for String {
  fn from(digest: ContentDigest) -> Self {
    digest.0
  }
}

impl fmt::Display for ContentDigest {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Short hex hash of a string, used for generated file names.
pub fn short_hash(value: &str, len: usize) -> String {
  let digest = ContentDigest::of(value.as_bytes());
  digest.hex()[..len.min(SHA256_HEX_LEN)].to_string()
}
