//! Recursive `include` expansion.
//!
//! [`IncludeExpander`] resolves a Makefile, then rewrites every `include`
//! directive so its targets point at local, recursively expanded copies. The
//! result is a set of generated files, one per distinct reference, named by a
//! short hash of the normalized reference.
//!
//! # Algorithm Overview
//!
//! 1. Resolve the reference to a local file
//! 2. Scan it line by line; lines that are not `include`, `-include` or
//!    `sinclude` directives are copied verbatim
//! 3. Classify each include target relative to the including file
//! 4. Fail with [`ExpandError::CyclicInclude`] if the target is already on the
//!    active chain, otherwise expand it depth-first with the chain extended
//! 5. Write the rewritten content atomically once it is complete
//!
//! The chain belongs to one branch of the walk: two siblings including the
//! same file is not a cycle.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::bytes::Regex;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::consts::{GENERATED_NAME_LEN, TMP_SUFFIX};
use crate::reference::Reference;
use crate::resolve::{ArtifactResolver, ResolveError};
use crate::util::fs::{AtomicWriteError, write_atomic};
use crate::util::hash::short_hash;

/// `include`, `-include` or `sinclude` at the start of a line (spaces only;
/// a leading tab makes it a recipe line). Byte-oriented so Makefiles in any
/// ASCII-compatible encoding pass through.
static INCLUDE_LINE: LazyLock<Option<Regex>> =
  LazyLock::new(|| Regex::new(r"(?-u)^( *)(-?include|sinclude)\s+(.+)$").ok());

/// Characters make would split or reinterpret inside an include target.
fn is_unsafe_in_target(c: char) -> bool {
  c.is_whitespace() || c == '#' || c == '$'
}

/// Errors that can occur during include expansion.
#[derive(Debug, Error)]
pub enum ExpandError {
  /// A reference includes itself, directly or transitively.
  #[error("cyclic include of '{reference}': {}", .chain.join(" -> "))]
  CyclicInclude { reference: String, chain: Vec<String> },

  /// An include target could not be resolved.
  #[error("failed to resolve include '{reference}': {source}")]
  Resolve {
    reference: String,
    #[source]
    source: ResolveError,
  },

  /// Generated paths under this directory cannot be written into an include line.
  #[error(
    "generated directory '{}' must be valid UTF-8 without whitespace, '#' or '$'",
    .path.display()
  )]
  UnsafeGeneratedDir { path: PathBuf },

  #[error("failed to read '{}': {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create generated directory '{}': {source}", .path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Write(#[from] AtomicWriteError),
}

/// A parsed include directive.
#[derive(Debug, PartialEq, Eq)]
struct IncludeLine<'a> {
  indent: &'a str,
  directive: &'a str,
  targets: Vec<&'a str>,
}

impl IncludeLine<'_> {
  /// `-include` and `sinclude` tolerate targets that cannot be resolved.
  fn is_optional(&self) -> bool {
    self.directive != "include"
  }
}

/// Parse `line` (without its line ending) as an include directive.
///
/// Returns `None` for ordinary lines, for directives with no targets after
/// comment stripping, for directives whose targets use make variables, and
/// for targets that are not UTF-8.
fn parse_include(line: &[u8]) -> Option<IncludeLine<'_>> {
  let captures = INCLUDE_LINE.as_ref()?.captures(line)?;
  let indent = std::str::from_utf8(captures.get(1)?.as_bytes()).ok()?;
  let directive = std::str::from_utf8(captures.get(2)?.as_bytes()).ok()?;
  let rest = captures.get(3)?.as_bytes();

  let rest = rest.iter().position(|&b| b == b'#').map_or(rest, |i| &rest[..i]);
  let rest = std::str::from_utf8(rest).ok()?;
  if rest.contains('$') {
    return None;
  }

  let targets: Vec<&str> = rest.split_whitespace().collect();
  if targets.is_empty() {
    return None;
  }

  Some(IncludeLine {
    indent,
    directive,
    targets,
  })
}

/// Outcome of [`IncludeExpander::open`].
enum Opened {
  /// Generated earlier in the same call.
  Expanded(PathBuf),
  /// Fetched or found locally; not yet rewritten.
  Resolved(Resolved),
}

struct Resolved {
  reference: Reference,
  /// Normalized form of `reference`.
  key: String,
  /// Local file holding the content.
  source: PathBuf,
}

/// State for one [`IncludeExpander::expand`] call.
#[derive(Default)]
struct Walk {
  /// Generated paths of references already expanded during this call.
  expanded: HashMap<String, PathBuf>,
}

/// Flattens include trees into generated files.
pub struct IncludeExpander<'a> {
  resolver: &'a ArtifactResolver,
  generated_dir: PathBuf,
}

impl<'a> IncludeExpander<'a> {
  pub fn new(resolver: &'a ArtifactResolver, generated_dir: impl Into<PathBuf>) -> Self {
    Self {
      resolver,
      generated_dir: generated_dir.into(),
    }
  }

  /// Expand `raw`, with relative local paths resolved against the current directory.
  ///
  /// Returns the path of the generated top-level file.
  pub fn expand(&self, raw: &str, use_cache: bool) -> Result<PathBuf, ExpandError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    self.expand_from(raw, &cwd, use_cache)
  }

  /// Expand `raw`, with relative local paths resolved against `base_dir`.
  ///
  /// # Errors
  ///
  /// [`ExpandError::UnsafeGeneratedDir`] before anything is resolved when the
  /// generated directory could not be named in an include line.
  pub fn expand_from(&self, raw: &str, base_dir: &Path, use_cache: bool) -> Result<PathBuf, ExpandError> {
    self.check_generated_dir()?;

    let reference = self
      .resolver
      .classify(raw, base_dir)
      .map_err(|e| ExpandError::Resolve {
        reference: raw.to_string(),
        source: e.into(),
      })?;

    let mut walk = Walk::default();
    let shown = reference.to_string();
    let path = match self.open(reference, &[], use_cache, &walk)? {
      Opened::Expanded(path) => path,
      Opened::Resolved(resolved) => self.expand_resolved(resolved, base_dir, Vec::new(), use_cache, &mut walk)?,
    };
    info!(reference = %shown, path = %path.display(), files = walk.expanded.len(), "expanded includes");
    Ok(path)
  }

  /// Path of the generated file for a normalized reference.
  pub fn generated_path(&self, normalized: &str) -> PathBuf {
    self
      .generated_dir
      .join(format!("{}.mk", short_hash(normalized, GENERATED_NAME_LEN)))
  }

  fn check_generated_dir(&self) -> Result<(), ExpandError> {
    match self.generated_dir.to_str() {
      Some(dir) if !dir.contains(is_unsafe_in_target) => Ok(()),
      _ => Err(ExpandError::UnsafeGeneratedDir {
        path: self.generated_dir.clone(),
      }),
    }
  }

  /// Check `reference` against the chain and the memo, then resolve it.
  ///
  /// Only this step's own failure is a [`ExpandError::Resolve`] for
  /// `reference`; expanding what it includes happens afterwards.
  fn open(&self, reference: Reference, chain: &[String], use_cache: bool, walk: &Walk) -> Result<Opened, ExpandError> {
    let key = reference.to_string();

    if chain.contains(&key) {
      let mut chain = chain.to_vec();
      chain.push(key.clone());
      return Err(ExpandError::CyclicInclude { reference: key, chain });
    }
    if let Some(path) = walk.expanded.get(&key) {
      trace!(reference = %key, "already expanded");
      return Ok(Opened::Expanded(path.clone()));
    }

    let source = self
      .resolver
      .resolve_reference(&reference, use_cache)
      .map_err(|source| ExpandError::Resolve {
        reference: key.clone(),
        source,
      })?;
    Ok(Opened::Resolved(Resolved { reference, key, source }))
  }

  /// Rewrite an already resolved file and write it out.
  fn expand_resolved(
    &self,
    Resolved { reference, key, source }: Resolved,
    base_dir: &Path,
    mut chain: Vec<String>,
    use_cache: bool,
    walk: &mut Walk,
  ) -> Result<PathBuf, ExpandError> {
    chain.push(key.clone());

    // Local files anchor their own relative includes; remote files inherit.
    let base_dir = match &reference {
      Reference::Local(path) => path.parent().unwrap_or(base_dir).to_path_buf(),
      Reference::Http(_) | Reference::Oci(_) => base_dir.to_path_buf(),
    };

    let content = fs::read(&source).map_err(|e| ExpandError::Read {
      path: source.clone(),
      source: e,
    })?;

    let mut output = Vec::with_capacity(content.len());
    for line in content.split_inclusive(|&b| b == b'\n') {
      let (body, ending) = split_line_ending(line);
      match parse_include(body) {
        Some(include) => {
          let rewritten = self.rewrite_include(&include, &base_dir, &chain, use_cache, walk)?;
          trace!(directive = include.directive, to = %rewritten, "rewrote include");
          output.extend_from_slice(rewritten.as_bytes());
          output.extend_from_slice(ending);
        }
        None => output.extend_from_slice(line),
      }
    }

    let dest = self.generated_path(&key);
    fs::create_dir_all(&self.generated_dir).map_err(|e| ExpandError::CreateDir {
      path: self.generated_dir.clone(),
      source: e,
    })?;
    write_atomic(&dest, TMP_SUFFIX, &output)?;
    debug!(reference = %key, path = %dest.display(), "wrote generated file");

    walk.expanded.insert(key, dest.clone());
    Ok(dest)
  }

  /// Rewrite one directive. For optional directives only a target that itself
  /// cannot be classified or resolved is kept as written; failures further
  /// down its include tree still propagate.
  fn rewrite_include(
    &self,
    include: &IncludeLine<'_>,
    base_dir: &Path,
    chain: &[String],
    use_cache: bool,
    walk: &mut Walk,
  ) -> Result<String, ExpandError> {
    let mut targets = Vec::with_capacity(include.targets.len());

    for &target in &include.targets {
      let opened = self
        .resolver
        .classify(target, base_dir)
        .map_err(|e| ExpandError::Resolve {
          reference: target.to_string(),
          source: e.into(),
        })
        .and_then(|reference| self.open(reference, chain, use_cache, walk));

      let path = match opened {
        Ok(Opened::Expanded(path)) => path,
        Ok(Opened::Resolved(resolved)) => self.expand_resolved(resolved, base_dir, chain.to_vec(), use_cache, walk)?,
        // A missing local name classifies as OCI, so a failed fetch also means missing.
        Err(ExpandError::Resolve { source, .. }) if include.is_optional() => {
          debug!(target, error = %source, "optional include unavailable, left as is");
          targets.push(target.to_string());
          continue;
        }
        Err(e) => return Err(e),
      };
      targets.push(path.display().to_string());
    }

    Ok(format!("{}{} {}", include.indent, include.directive, targets.join(" ")))
  }
}

fn split_line_ending(line: &[u8]) -> (&[u8], &[u8]) {
  if let Some(body) = line.strip_suffix(b"\r\n") {
    (body, &line[body.len()..])
  } else if let Some(body) = line.strip_suffix(b"\n") {
    (body, &line[body.len()..])
  } else {
    (line, &line[line.len()..])
  }
}
