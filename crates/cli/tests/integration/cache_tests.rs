use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn push_then_list_shows_ref() {
  let env = TestEnv::new();
  env.push("registry.example.com/org/make:v1", "hello");

  env
    .mkfetch_cmd()
    .args(["cache", "list"])
    .assert()
    .success()
    .stdout(predicate::str::contains("registry.example.com/org/make:v1"))
    .stdout(predicate::str::contains("sha256:2cf24dba5fb0"));
}

#[test]
fn push_reports_digest() {
  let env = TestEnv::new();
  let file = env.write_file("rules.mk", "hello");

  env
    .mkfetch_cmd()
    .args(["cache", "push"])
    .arg(&file)
    .arg("oci://registry.example.com/org/make:v1")
    .args(["-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains(
      "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
    ));
}

#[test]
fn pushing_identical_content_twice_keeps_one_blob() {
  let env = TestEnv::new();
  env.push("registry.example.com/org/make:v1", "same");
  env.push("registry.example.com/org/make:v1", "same");

  // one blob, one ref
  assert_eq!(env.cache_file_count(), 2);
}

#[test]
fn http_push_uses_escaped_scope() {
  let env = TestEnv::new();
  env.push("https://example.com/mk/common.mk", "X := 1\n");

  let scope = env
    .cache_root()
    .join("http")
    .join("example.com")
    .join("https:%2F%2Fexample.com%2Fmk%2Fcommon.mk");
  assert!(scope.join("refs").join("latest").symlink_metadata().is_ok());
}

#[test]
fn list_json_is_valid() {
  let env = TestEnv::new();
  env.push("registry.example.com/org/make:v1", "hello");

  let out = env.mkfetch_cmd().args(["cache", "list", "-o", "json"]).output().unwrap();
  let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();

  let entries = json.as_array().unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0]["scope"], "registry.example.com/org/make");
  assert_eq!(entries[0]["reference"], "v1");
  assert_eq!(entries[0]["dangling"], false);
}

#[test]
fn push_of_missing_file_fails() {
  let env = TestEnv::new();

  env
    .mkfetch_cmd()
    .args(["cache", "push", "nope.mk", "registry.example.com/org/make:v1"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn push_to_local_path_fails() {
  let env = TestEnv::new();
  let file = env.write_file("rules.mk", "x");

  env
    .mkfetch_cmd()
    .args(["cache", "push"])
    .arg(&file)
    .arg(&file)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("cannot be stored in the cache"));
}
