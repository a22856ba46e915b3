use predicates::prelude::*;

use super::common::{TestEnv, UNREACHABLE_REGISTRY};

#[test]
fn cached_oci_reference_resolves_offline() {
  let env = TestEnv::new();
  let reference = format!("oci://{}/org/make:v1", UNREACHABLE_REGISTRY);
  env.push(&reference, "all:\n\t@echo cached\n");

  let out = env.mkfetch_cmd().args(["resolve", &reference]).output().unwrap();

  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  let path = String::from_utf8(out.stdout).unwrap();
  let path = std::path::Path::new(path.trim());
  assert!(path.starts_with(env.cache_root()));
  assert_eq!(std::fs::read_to_string(path).unwrap(), "all:\n\t@echo cached\n");
}

#[test]
fn default_registry_flag_applies_to_short_references() {
  let env = TestEnv::new();
  // A single path segment gets the default registry prepended.
  env.push(&format!("{}/make:v1", UNREACHABLE_REGISTRY), "Y := 1\n");
  env
    .mkfetch_cmd()
    .args(["resolve", "make:v1", "--registry", UNREACHABLE_REGISTRY, "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("oci://{}/make:v1", UNREACHABLE_REGISTRY)))
    .stdout(predicate::str::contains("\"kind\": \"oci\""));
}

#[test]
fn no_cache_skips_cached_copy() {
  let env = TestEnv::new();
  let reference = format!("oci://{}/org/make:v1", UNREACHABLE_REGISTRY);
  env.push(&reference, "all:\n");
  let before = env.cache_file_count();

  env
    .mkfetch_cmd()
    .args(["resolve", &reference, "--no-cache", "--insecure"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Failed to resolve"));

  assert_eq!(env.cache_file_count(), before);
}

#[test]
fn missing_local_file_looks_like_oci_and_fails() {
  let env = TestEnv::new();

  env
    .mkfetch_cmd()
    .args(["resolve", "does-not-exist.mk", "--registry", UNREACHABLE_REGISTRY, "--insecure"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("does-not-exist.mk"));

  assert_eq!(env.cache_file_count(), 0);
}

#[test]
#[ignore] // Requires network access
fn http_reference_is_fetched_and_cached() {
  let env = TestEnv::new();
  let url = "https://raw.githubusercontent.com/git/git/master/Makefile";

  env.mkfetch_cmd().args(["resolve", url]).assert().success();
  assert!(env.cache_file_count() >= 2);

  env
    .mkfetch_cmd()
    .args(["cache", "list"])
    .assert()
    .success()
    .stdout(predicate::str::contains("http/raw.githubusercontent.com"));
}
