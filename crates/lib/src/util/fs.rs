//! Atomic file writes.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Which step of an atomic write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
  Create,
  Write,
  Rename,
}

impl WriteStep {
  pub fn as_str(self) -> &'static str {
    match self {
      WriteStep::Create => "create",
      WriteStep::Write => "write",
      WriteStep::Rename => "rename",
    }
  }
}

/// A failed atomic write.
#[derive(Debug, Error)]
#[error("failed to {step} '{path}': {source}", step = .step.as_str(), path = .path.display())]
pub struct AtomicWriteError {
  pub step: WriteStep,
  pub path: PathBuf,
  #[source]
  pub source: io::Error,
}

/// Directory that holds `dest`; `.` for a bare file name.
pub fn parent_dir(dest: &Path) -> &Path {
  match dest.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  }
}

/// Hidden prefix for temporaries next to `dest` (`.<file name>.`).
pub fn tmp_prefix(dest: &Path) -> OsString {
  let mut prefix = OsString::from(".");
  if let Some(name) = dest.file_name() {
    prefix.push(name);
    prefix.push(".");
  }
  prefix
}

/// Write `data` to a fresh temporary file beside `dest`, flush it to disk, then
/// rename it over `dest`.
///
/// Every call gets its own uniquely named temporary (`.<name>.<random><suffix>`),
/// so concurrent writers of the same `dest` never share one. Readers never
/// observe a partially written `dest`; the last rename wins. The temporary is
/// removed on failure.
pub fn write_atomic(dest: &Path, suffix: &str, data: &[u8]) -> Result<(), AtomicWriteError> {
  let dir = parent_dir(dest);

  let mut tmp = tempfile::Builder::new()
    .prefix(&tmp_prefix(dest))
    .suffix(suffix)
    .tempfile_in(dir)
    .map_err(|source| AtomicWriteError {
      step: WriteStep::Create,
      path: dir.to_path_buf(),
      source,
    })?;

  tmp
    .write_all(data)
    .and_then(|()| tmp.as_file().sync_all())
    .map_err(|source| AtomicWriteError {
      step: WriteStep::Write,
      path: tmp.path().to_path_buf(),
      source,
    })?;

  tmp.persist(dest).map_err(|e| AtomicWriteError {
    step: WriteStep::Rename,
    path: dest.to_path_buf(),
    source: e.error,
  })?;
  Ok(())
}
