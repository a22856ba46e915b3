use predicates::prelude::*;

use super::common::{TestEnv, UNREACHABLE_REGISTRY};

fn expanded_path(out: &std::process::Output) -> std::path::PathBuf {
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  std::path::PathBuf::from(String::from_utf8_lossy(&out.stdout).trim())
}

#[test]
fn local_includes_are_flattened_into_generated_dir() {
  let env = TestEnv::new();
  env.write_file("Makefile", "include mk/common.mk\nall: common\n");
  env.write_file("mk/common.mk", "common:\n\t@echo common\n");

  let out = env.mkfetch_cmd().args(["expand", "Makefile"]).output().unwrap();
  let top = expanded_path(&out);

  assert!(top.starts_with(env.generated_path()));
  let content = std::fs::read_to_string(&top).unwrap();
  let included = content.lines().next().unwrap().strip_prefix("include ").unwrap();
  assert!(included.starts_with(&env.generated_path().display().to_string()));
  assert_eq!(
    std::fs::read_to_string(included).unwrap(),
    "common:\n\t@echo common\n"
  );
}

#[test]
fn cached_remote_include_is_expanded() {
  let env = TestEnv::new();
  let remote = format!("oci://{}/org/rules:v1", UNREACHABLE_REGISTRY);
  env.push(&remote, "RULES := 1\n");
  env.write_file("Makefile", &format!("include {} # shared rules\n", remote));

  let out = env.mkfetch_cmd().args(["expand", "Makefile"]).output().unwrap();
  let top = expanded_path(&out);

  let content = std::fs::read_to_string(top).unwrap();
  assert!(!content.contains("oci://"));
  assert!(!content.contains("shared rules"));
}

#[test]
fn cyclic_include_fails() {
  let env = TestEnv::new();
  env.write_file("a.mk", "include b.mk\n");
  env.write_file("b.mk", "include a.mk\n");

  env
    .mkfetch_cmd()
    .args(["expand", "a.mk"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("cyclic include"));

  assert!(!env.generated_path().exists());
}

#[test]
fn json_output_names_generated_file() {
  let env = TestEnv::new();
  env.write_file("Makefile", "all:\n");

  env
    .mkfetch_cmd()
    .args(["expand", "Makefile", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"path\""))
    .stdout(predicate::str::contains(".mk"));
}

#[test]
fn generated_dir_flag_moves_output() {
  let env = TestEnv::new();
  env.write_file("Makefile", "all:\n");
  let dir = env.temp.path().join("build-mk");

  let out = env
    .mkfetch_cmd()
    .args(["expand", "Makefile", "--generated-dir"])
    .arg(&dir)
    .output()
    .unwrap();

  assert!(expanded_path(&out).starts_with(&dir));
  assert!(!env.generated_path().exists());
}

#[test]
fn generated_dir_with_space_is_rejected() {
  let env = TestEnv::new();
  env.write_file("Makefile", "all:\n");
  let dir = env.temp.path().join("build mk");

  env
    .mkfetch_cmd()
    .env("MKFETCH_GENERATED_DIR", &dir)
    .args(["expand", "Makefile"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("without whitespace"));

  assert!(!dir.exists());
}
