//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// An OCI registry nothing listens on.
pub const UNREACHABLE_REGISTRY: &str = "127.0.0.1:9";

/// Isolated test environment.
///
/// Each test gets its own temporary directory with isolated cache, generated
/// and working paths.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };
    std::fs::create_dir_all(env.work_path()).unwrap();
    env
  }

  /// Write a file relative to the working directory.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.work_path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  /// Working directory the binary runs in.
  pub fn work_path(&self) -> PathBuf {
    let p = self.temp.path().join("work");
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Cache root (isolated per test).
  pub fn cache_root(&self) -> PathBuf {
    self.temp.path().join("cache").join("artifacts")
  }

  /// Generated-file directory, next to the cache root.
  pub fn generated_path(&self) -> PathBuf {
    self.temp.path().join("cache").join("generated")
  }

  /// Scratch space for throwaway copies.
  pub fn scratch_path(&self) -> PathBuf {
    let p = self.temp.path().join("tmp");
    std::fs::create_dir_all(&p).unwrap();
    p
  }

  /// Number of files (not directories) under the cache root.
  pub fn cache_file_count(&self) -> usize {
    fn count(dir: &std::path::Path) -> usize {
      let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
      };
      entries
        .filter_map(Result::ok)
        .map(|e| {
          let path = e.path();
          if path.is_dir() && !path.is_symlink() { count(&path) } else { 1 }
        })
        .sum()
    }
    count(&self.cache_root())
  }

  /// Get a pre-configured Command for the mkfetch binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `MKFETCH_CACHE_DIR`: Isolated cache root
  /// - `XDG_CACHE_HOME`: Isolated fallback cache path
  /// - `TMPDIR`: Isolated scratch space for uncached fetches
  ///
  /// Other `MKFETCH_*` variables are cleared.
  pub fn mkfetch_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("mkfetch");
    cmd.env("MKFETCH_CACHE_DIR", self.cache_root());
    cmd.env("XDG_CACHE_HOME", self.temp.path().join("xdg"));
    cmd.env("TMPDIR", self.scratch_path());
    cmd.env_remove("MKFETCH_GENERATED_DIR");
    cmd.env_remove("MKFETCH_DEFAULT_REGISTRY");
    cmd.env_remove("MKFETCH_INSECURE");
    cmd.env_remove("MKFETCH_MAKE");
    cmd.env_remove("MKFETCH_REGISTRY_USERNAME");
    cmd.env_remove("MKFETCH_REGISTRY_PASSWORD");
    cmd.current_dir(self.work_path());
    cmd
  }

  /// Seed the cache with `content` under `reference`.
  pub fn push(&self, reference: &str, content: &str) {
    let name = format!("seed-{}.mk", self.cache_file_count());
    let file = self.temp.path().join(name);
    std::fs::write(&file, content).unwrap();
    self
      .mkfetch_cmd()
      .args(["cache", "push"])
      .arg(&file)
      .arg(reference)
      .assert()
      .success();
  }
}
