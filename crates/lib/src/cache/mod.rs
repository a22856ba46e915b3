//! Content-addressed artifact cache.
//!
//! Blobs are immutable and named by their digest; refs are mutable symlinks
//! that map a tag (or digest) to a blob, mirroring a registry's own tag/digest
//! split. The cache does no network I/O.
//!
//! # Layout
//!
//! ```text
//! <cache_root>/
//! ├── ghcr.io/org/makefiles/               # OCI scope
//! │   ├── blobs/sha256:<hex>               # immutable content
//! │   └── refs/v1 -> .../blobs/sha256:<hex>
//! └── http/example.com/<escaped-url>/      # HTTP scope
//!     ├── blobs/sha256:<hex>
//!     └── refs/latest -> .../blobs/sha256:<hex>
//! ```
//!
//! Each writer stages its blob in its own `blobs/.<digest>.<random>.tmp` and
//! renames it into place, so an interrupted or concurrent writer never leaves
//! a partial blob under its final name. Refs are swapped the same way: a new
//! link is made under a temporary name and renamed over the old one.
//! Nothing is ever deleted; eviction is not this module's job.

mod scope;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace};
use walkdir::WalkDir;

pub use scope::{Scope, escape_url};

use crate::consts::{BLOBS_DIR, REFS_DIR, TMP_SUFFIX};
use crate::util::fs::{WriteStep, parent_dir, tmp_prefix, write_atomic};
use crate::util::hash::ContentDigest;

/// The filesystem operation that failed while writing to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
  Mkdir,
  Create,
  Write,
  Rename,
  Symlink,
}

impl fmt::Display for CacheOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let op = match self {
      CacheOp::Mkdir => "mkdir",
      CacheOp::Create => "create",
      CacheOp::Write => "write",
      CacheOp::Rename => "rename",
      CacheOp::Symlink => "symlink",
    };
    f.write_str(op)
  }
}

impl From<WriteStep> for CacheOp {
  fn from(step: WriteStep) -> Self {
    match step {
      WriteStep::Create => CacheOp::Create,
      WriteStep::Write => CacheOp::Write,
      WriteStep::Rename => CacheOp::Rename,
    }
  }
}

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
  /// No usable blob for the ref. Expected; callers fall back to fetching.
  #[error("no cached artifact for '{reference}' in '{scope}'")]
  Miss { scope: String, reference: String },

  /// The scope or ref name cannot be mapped onto the cache layout.
  #[error("invalid reference '{reference}': {reason}")]
  InvalidReference { reference: String, reason: String },

  /// A filesystem write failed.
  #[error("cache write failed: {op} '{path}': {source}")]
  Write {
    op: CacheOp,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Walking the cache directory failed.
  #[error("failed to read cache at '{path}': {message}")]
  Read { path: PathBuf, message: String },
}

impl CacheError {
  pub(crate) fn invalid(reference: &str, reason: impl Into<String>) -> Self {
    CacheError::InvalidReference {
      reference: reference.to_string(),
      reason: reason.into(),
    }
  }

  fn write(op: CacheOp, path: &Path) -> impl FnOnce(io::Error) -> Self {
    let path = path.to_path_buf();
    move |source| CacheError::Write { op, path, source }
  }

  /// Whether this is an ordinary cache miss.
  pub fn is_miss(&self) -> bool {
    matches!(self, CacheError::Miss { .. })
  }
}

/// One ref found by [`ContentCache::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
  pub scope: String,
  pub reference: String,
  /// Digest of the blob the ref points at, when the target is a blob.
  pub digest: Option<ContentDigest>,
  pub target: PathBuf,
  /// The ref points at a blob that no longer exists.
  pub dangling: bool,
}

/// The content-addressed artifact cache.
#[derive(Debug, Clone)]
pub struct ContentCache {
  root: PathBuf,
}

impl ContentCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn scope_dir(&self, scope: &Scope) -> PathBuf {
    self.root.join(scope.relative_path())
  }

  pub fn blob_path(&self, scope: &Scope, digest: &ContentDigest) -> PathBuf {
    self.scope_dir(scope).join(BLOBS_DIR).join(digest.as_str())
  }

  pub fn ref_path(&self, scope: &Scope, reference: &str) -> Result<PathBuf, CacheError> {
    scope::validate_component(reference, reference)?;
    Ok(self.scope_dir(scope).join(REFS_DIR).join(reference))
  }

  /// Store `data` and point `refs/<reference>` at it.
  ///
  /// The blob is written only if no blob with the same digest exists; the ref
  /// is always replaced, atomically. Concurrent pushes of the same content all
  /// succeed. Returns the blob path.
  ///
  /// # Errors
  ///
  /// [`CacheError::InvalidReference`] for a malformed ref name,
  /// [`CacheError::Write`] for any filesystem failure.
  pub fn push(&self, scope: &Scope, reference: &str, data: &[u8]) -> Result<PathBuf, CacheError> {
    let ref_path = self.ref_path(scope, reference)?;
    let digest = ContentDigest::of(data);
    let blob_path = absolute(&self.blob_path(scope, &digest))?;

    if let Some(blobs_dir) = blob_path.parent() {
      fs::create_dir_all(blobs_dir).map_err(CacheError::write(CacheOp::Mkdir, blobs_dir))?;
    }

    if blob_path.is_file() {
      debug!(%scope, %digest, "blob already cached");
    } else {
      match write_atomic(&blob_path, TMP_SUFFIX, data) {
        Ok(()) => info!(%scope, %digest, size = data.len(), "stored blob"),
        // a concurrent writer got there first with the same bytes
        Err(e) if holds_digest(&blob_path, &digest) => {
          debug!(%scope, %digest, error = %e, "blob stored by another writer");
        }
        Err(e) => {
          return Err(CacheError::Write {
            op: e.step.into(),
            path: e.path,
            source: e.source,
          });
        }
      }
    }

    if let Some(refs_dir) = ref_path.parent() {
      fs::create_dir_all(refs_dir).map_err(CacheError::write(CacheOp::Mkdir, refs_dir))?;
    }

    replace_file_link(&blob_path, &ref_path)?;
    debug!(%scope, reference, %digest, "updated ref");

    Ok(blob_path)
  }

  /// Find the blob for `refs/<reference>`.
  ///
  /// Resolution order:
  /// 1. `refs/<reference>` is a symlink to an existing file: its target
  /// 2. `refs/<reference>` is a plain file: the ref itself
  /// 3. `reference` is a digest and `blobs/<reference>` exists: the blob
  ///
  /// A dangling ref falls through to the next rule.
  ///
  /// # Errors
  ///
  /// [`CacheError::Miss`] when nothing matches, [`CacheError::InvalidReference`]
  /// for a malformed ref name. No other error is possible.
  pub fn pull(&self, scope: &Scope, reference: &str) -> Result<PathBuf, CacheError> {
    let ref_path = self.ref_path(scope, reference)?;

    match fs::symlink_metadata(&ref_path) {
      Ok(meta) if meta.file_type().is_symlink() => {
        if let Some(target) = link_target(&ref_path)
          && target.is_file()
        {
          trace!(%scope, reference, target = %target.display(), "ref hit");
          return Ok(target);
        }
        debug!(%scope, reference, "ref is dangling");
      }
      Ok(meta) if meta.is_file() => {
        trace!(%scope, reference, "ref is a plain file");
        return Ok(ref_path);
      }
      _ => {}
    }

    if let Ok(digest) = reference.parse::<ContentDigest>() {
      let blob_path = self.blob_path(scope, &digest);
      if blob_path.is_file() {
        trace!(%scope, %digest, "digest blob hit");
        return Ok(blob_path);
      }
    }

    Err(CacheError::Miss {
      scope: scope.to_string(),
      reference: reference.to_string(),
    })
  }

  /// List every ref in the cache, sorted by scope then ref name.
  pub fn list(&self) -> Result<Vec<CacheEntry>, CacheError> {
    if !self.root.exists() {
      return Ok(Vec::new());
    }

    let mut entries = Vec::new();

    for entry in WalkDir::new(&self.root).sort_by_file_name() {
      let entry = entry.map_err(|e| CacheError::Read {
        path: self.root.clone(),
        message: e.to_string(),
      })?;

      if entry.file_type().is_dir() {
        continue;
      }
      let path = entry.path();
      let Some(refs_dir) = path.parent().filter(|p| p.file_name().is_some_and(|n| n == REFS_DIR)) else {
        continue;
      };
      let Some(scope_dir) = refs_dir.parent() else {
        continue;
      };

      let scope = scope_dir
        .strip_prefix(&self.root)
        .unwrap_or(scope_dir)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
      let reference = entry.file_name().to_string_lossy().into_owned();
      if reference.starts_with('.') && reference.ends_with(TMP_SUFFIX) {
        // a ref swap in flight
        continue;
      }

      let target = if entry.path_is_symlink() {
        link_target(path).unwrap_or_else(|| path.to_path_buf())
      } else {
        path.to_path_buf()
      };
      let digest = target
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.parse::<ContentDigest>().ok());

      entries.push(CacheEntry {
        scope,
        reference,
        digest,
        dangling: !target.is_file(),
        target,
      });
    }

    Ok(entries)
  }
}

/// Resolve a ref symlink's target; relative targets are relative to the ref's directory.
fn link_target(link: &Path) -> Option<PathBuf> {
  let target = fs::read_link(link).ok()?;
  if target.is_relative() {
    Some(link.parent()?.join(target))
  } else {
    Some(target)
  }
}

fn absolute(path: &Path) -> Result<PathBuf, CacheError> {
  std::path::absolute(path).map_err(CacheError::write(CacheOp::Mkdir, path))
}

fn holds_digest(path: &Path, digest: &ContentDigest) -> bool {
  ContentDigest::of_file(path).is_ok_and(|actual| actual == *digest)
}

/// Point `link` at `target`, replacing whatever `link` was, in one rename.
fn replace_file_link(target: &Path, link: &Path) -> Result<(), CacheError> {
  let staged = tempfile::Builder::new()
    .prefix(&tmp_prefix(link))
    .suffix(TMP_SUFFIX)
    .make_in(parent_dir(link), |path| create_file_link(target, path))
    .map_err(CacheError::write(CacheOp::Symlink, link))?;

  staged
    .persist(link)
    .map_err(|e| CacheError::write(CacheOp::Rename, link)(e.error))?;
  trace!(link = %link.display(), target = %target.display(), "swapped ref");
  Ok(())
}

/// Create a file symlink (Unix).
#[cfg(unix)]
fn create_file_link(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

/// Create a file symlink (Windows). Requires developer mode or admin rights.
#[cfg(windows)]
fn create_file_link(target: &Path, link: &Path) -> io::Result<()> {
  std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn cache() -> (TempDir, ContentCache) {
    let temp = TempDir::new().unwrap();
    let cache = ContentCache::new(temp.path().join("cache"));
    (temp, cache)
  }

  fn scope() -> Scope {
    "example.com/repo".parse().unwrap()
  }

  fn blob_count(cache: &ContentCache, scope: &Scope) -> usize {
    fs::read_dir(cache.scope_dir(scope).join(BLOBS_DIR)).unwrap().count()
  }

  mod push_pull {
    use super::*;

    #[test]
    fn hello_round_trip() {
      let (_temp, cache) = cache();
      cache.push(&scope(), "latest", b"hello").unwrap();

      let path = cache.pull(&scope(), "latest").unwrap();
      assert_eq!(fs::read(&path).unwrap(), b"hello");
      assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
      );
    }

    #[test]
    fn blob_name_is_digest_of_contents() {
      let (_temp, cache) = cache();
      let payload = b"include common.mk\nall:\n\t@echo ok\n";
      let path = cache.push(&scope(), "v1", payload).unwrap();

      let digest = ContentDigest::of_file(&path).unwrap();
      assert_eq!(path.file_name().unwrap().to_str().unwrap(), digest.as_str());
    }

    #[test]
    fn empty_payload_round_trips() {
      let (_temp, cache) = cache();
      cache.push(&scope(), "empty", b"").unwrap();
      assert_eq!(fs::read(cache.pull(&scope(), "empty").unwrap()).unwrap(), b"");
    }

    #[test]
    fn repeated_push_dedupes_blob_and_ref() {
      let (_temp, cache) = cache();
      let first = cache.push(&scope(), "latest", b"same").unwrap();
      let second = cache.push(&scope(), "latest", b"same").unwrap();

      assert_eq!(first, second);
      assert_eq!(blob_count(&cache, &scope()), 1);
      assert_eq!(fs::read_dir(cache.scope_dir(&scope()).join(REFS_DIR)).unwrap().count(), 1);
    }

    #[test]
    fn retag_points_at_new_blob() {
      let (_temp, cache) = cache();
      cache.push(&scope(), "latest", b"one").unwrap();
      cache.push(&scope(), "latest", b"two").unwrap();

      assert_eq!(fs::read(cache.pull(&scope(), "latest").unwrap()).unwrap(), b"two");
      // the old blob stays
      assert_eq!(blob_count(&cache, &scope()), 2);
    }

    #[test]
    fn identical_content_under_two_tags_shares_a_blob() {
      let (_temp, cache) = cache();
      let a = cache.push(&scope(), "a", b"shared").unwrap();
      let b = cache.push(&scope(), "b", b"shared").unwrap();
      assert_eq!(a, b);
      assert_eq!(blob_count(&cache, &scope()), 1);
    }

    #[test]
    fn no_temp_files_remain() {
      let (_temp, cache) = cache();
      cache.push(&scope(), "latest", b"data").unwrap();
      cache.push(&scope(), "latest", b"more").unwrap();

      for dir in [BLOBS_DIR, REFS_DIR] {
        let leftovers = fs::read_dir(cache.scope_dir(&scope()).join(dir))
          .unwrap()
          .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(TMP_SUFFIX))
          .count();
        assert_eq!(leftovers, 0, "temp files left in {dir}");
      }
    }

    #[test]
    fn concurrent_pushes_of_same_content_all_succeed() {
      let (_temp, cache) = cache();
      let payload = b"include shared.mk\nall:\n\t@echo ok\n";

      for round in 0..8 {
        let barrier = std::sync::Barrier::new(4);
        std::thread::scope(|s| {
          let handles: Vec<_> = (0..4)
            .map(|n| {
              let (cache, barrier) = (&cache, &barrier);
              s.spawn(move || {
                barrier.wait();
                cache.push(&scope(), &format!("r{round}-t{n}"), payload)
              })
            })
            .collect();
          for handle in handles {
            let blob = handle.join().unwrap().unwrap();
            assert_eq!(fs::read(blob).unwrap(), payload);
          }
        });
      }

      assert_eq!(blob_count(&cache, &scope()), 1);
      assert_eq!(cache.list().unwrap().len(), 32);
    }

    #[test]
    fn concurrent_retags_leave_a_valid_ref() {
      let (_temp, cache) = cache();
      let barrier = std::sync::Barrier::new(4);

      std::thread::scope(|s| {
        let handles: Vec<_> = (0..4u8)
          .map(|n| {
            let (cache, barrier) = (&cache, &barrier);
            s.spawn(move || {
              barrier.wait();
              cache.push(&scope(), "latest", &[b'a' + n])
            })
          })
          .collect();
        for handle in handles {
          handle.join().unwrap().unwrap();
        }
      });

      let content = fs::read(cache.pull(&scope(), "latest").unwrap()).unwrap();
      assert!(matches!(content.as_slice(), [b'a'..=b'd']));
      assert_eq!(cache.list().unwrap().len(), 1);
    }

    #[test]
    #[cfg(unix)]
    fn ref_is_symlink_to_blob() {
      let (_temp, cache) = cache();
      let blob = cache.push(&scope(), "latest", b"linked").unwrap();
      let ref_path = cache.ref_path(&scope(), "latest").unwrap();

      assert!(ref_path.symlink_metadata().unwrap().file_type().is_symlink());
      assert_eq!(fs::read_link(&ref_path).unwrap(), blob);
    }
  }

  mod misses {
    use super::*;

    #[test]
    fn never_pushed_is_miss() {
      let (_temp, cache) = cache();
      let err = cache.pull(&scope(), "latest").unwrap_err();
      assert!(err.is_miss(), "unexpected error: {err}");
    }

    #[test]
    fn dangling_ref_is_miss() {
      let (_temp, cache) = cache();
      let blob = cache.push(&scope(), "latest", b"gone").unwrap();
      fs::remove_file(&blob).unwrap();

      assert!(cache.pull(&scope(), "latest").unwrap_err().is_miss());
    }

    #[test]
    fn scheme_in_ref_is_invalid() {
      let (temp, cache) = cache();
      let err = cache.pull(&scope(), "http://example.com/a.mk").unwrap_err();
      assert!(matches!(err, CacheError::InvalidReference { .. }));
      // rejected before touching the filesystem
      assert!(!temp.path().join("cache").exists());
    }

    #[test]
    fn traversal_in_ref_is_invalid() {
      let (_temp, cache) = cache();
      assert!(matches!(
        cache.push(&scope(), "..", b"x"),
        Err(CacheError::InvalidReference { .. })
      ));
    }
  }

  mod digests {
    use super::*;

    #[test]
    fn pull_by_digest_without_digest_ref() {
      let (_temp, cache) = cache();
      cache.push(&scope(), "latest", b"hello").unwrap();
      let digest = ContentDigest::of(b"hello");

      let path = cache.pull(&scope(), digest.as_str()).unwrap();
      assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn pull_by_unknown_digest_is_miss() {
      let (_temp, cache) = cache();
      cache.push(&scope(), "latest", b"hello").unwrap();
      let digest = ContentDigest::of(b"other");
      assert!(cache.pull(&scope(), digest.as_str()).unwrap_err().is_miss());
    }

    #[test]
    fn push_under_digest_ref() {
      let (_temp, cache) = cache();
      let digest = ContentDigest::of(b"pinned");
      cache.push(&scope(), digest.as_str(), b"pinned").unwrap();

      assert!(cache.ref_path(&scope(), digest.as_str()).unwrap().symlink_metadata().is_ok());
      assert_eq!(fs::read(cache.pull(&scope(), digest.as_str()).unwrap()).unwrap(), b"pinned");
    }
  }

  mod degenerate_refs {
    use super::*;

    #[test]
    fn plain_file_ref_returns_itself() {
      let (_temp, cache) = cache();
      let ref_path = cache.ref_path(&scope(), "manual").unwrap();
      fs::create_dir_all(ref_path.parent().unwrap()).unwrap();
      fs::write(&ref_path, "placed by hand").unwrap();

      assert_eq!(cache.pull(&scope(), "manual").unwrap(), ref_path);
    }

    #[test]
    #[cfg(unix)]
    fn relative_symlink_ref_resolves() {
      let (_temp, cache) = cache();
      let digest = ContentDigest::of(b"rel");
      let blob = cache.blob_path(&scope(), &digest);
      fs::create_dir_all(blob.parent().unwrap()).unwrap();
      fs::write(&blob, "rel").unwrap();

      let ref_path = cache.ref_path(&scope(), "v1").unwrap();
      fs::create_dir_all(ref_path.parent().unwrap()).unwrap();
      std::os::unix::fs::symlink(Path::new("..").join(BLOBS_DIR).join(digest.as_str()), &ref_path).unwrap();

      assert_eq!(fs::read(cache.pull(&scope(), "v1").unwrap()).unwrap(), b"rel");
    }
  }

  mod listing {
    use super::*;

    #[test]
    fn missing_root_lists_nothing() {
      let (_temp, cache) = cache();
      assert!(cache.list().unwrap().is_empty());
    }

    #[test]
    fn lists_refs_with_digests() {
      let (_temp, cache) = cache();
      let oci = Scope::oci("ghcr.io", "org/make").unwrap();
      cache.push(&oci, "v1", b"one").unwrap();
      cache.push(&scope(), "latest", b"two").unwrap();

      let entries = cache.list().unwrap();
      assert_eq!(entries.len(), 2);
      assert_eq!(entries[0].scope, "example.com/repo");
      assert_eq!(entries[0].reference, "latest");
      assert_eq!(entries[0].digest, Some(ContentDigest::of(b"two")));
      assert_eq!(entries[1].scope, "ghcr.io/org/make");
      assert!(!entries[1].dangling);
    }

    #[test]
    fn dangling_refs_are_flagged() {
      let (_temp, cache) = cache();
      let blob = cache.push(&scope(), "latest", b"bye").unwrap();
      fs::remove_file(blob).unwrap();

      let entries = cache.list().unwrap();
      assert_eq!(entries.len(), 1);
      assert!(entries[0].dangling);
    }
  }
}
