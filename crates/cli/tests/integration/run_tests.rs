//! `mkfetch run` tests.
//!
//! `MKFETCH_MAKE` points at `true`/`false` so no real make is needed.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
#[cfg(unix)]
fn run_succeeds_when_make_succeeds() {
  let env = TestEnv::new();
  env.write_file("Makefile", "all:\n");

  env
    .mkfetch_cmd()
    .env("MKFETCH_MAKE", "true")
    .args(["run", "Makefile", "--", "all"])
    .assert()
    .success();

  assert!(env.generated_path().exists());
}

#[test]
#[cfg(unix)]
fn run_propagates_make_exit_code() {
  let env = TestEnv::new();
  env.write_file("Makefile", "all:\n");

  env
    .mkfetch_cmd()
    .env("MKFETCH_MAKE", "false")
    .args(["run", "Makefile"])
    .assert()
    .code(1);
}

#[test]
fn run_with_missing_make_binary_fails() {
  let env = TestEnv::new();
  env.write_file("Makefile", "all:\n");

  env
    .mkfetch_cmd()
    .env("MKFETCH_MAKE", "mkfetch-no-such-make")
    .args(["run", "Makefile"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Failed to run mkfetch-no-such-make"));
}

#[test]
fn run_does_not_start_make_on_cycle() {
  let env = TestEnv::new();
  env.write_file("a.mk", "include b.mk\n");
  env.write_file("b.mk", "include a.mk\n");

  env
    .mkfetch_cmd()
    .env("MKFETCH_MAKE", "mkfetch-no-such-make")
    .args(["run", "a.mk"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("cyclic include"));
}
