use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tflens() -> Command {
    let mut cmd = Command::cargo_bin("tflens").expect("binary should build");
    // Keep ambient configuration out of the test.
    cmd.env_remove("TFLENS_ENABLE_NESTED_MODULES");
    cmd.env_remove("TFLENS_IGNORE_HIDDEN_DIRECTORIES");
    cmd.env_remove("EXTERNAL_MODULES_DIR");
    cmd
}

#[test]
fn test_dump_prints_definitions() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.tf"),
        r#"
resource "aws_s3_bucket" "b" {
  bucket = "x"
}
"#,
    )
    .unwrap();

    tflens()
        .arg("dump")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("aws_s3_bucket"))
        .stdout(predicate::str::contains("main.tf"));
}

#[test]
fn test_dump_reports_parse_errors_on_stderr() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.tf"), "not hcl {{{").unwrap();
    fs::write(dir.path().join("good.tf"), "locals { a = 1 }").unwrap();

    tflens()
        .arg("dump")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("good.tf"))
        .stderr(predicate::str::contains("bad.tf"));
}

#[test]
fn test_vars_prints_variable_bindings() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.tf"), r#"variable "v" { default = "d" }"#).unwrap();

    tflens()
        .arg("vars")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"v\""))
        .stdout(predicate::str::contains("\"d\""));
}

#[test]
fn test_deps_prints_dependency_map() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("main.tf"),
        r#"
module "m" {
  source = "./mod"
  x      = "1"
}
"#,
    )
    .unwrap();
    fs::create_dir(dir.path().join("mod")).unwrap();
    fs::write(dir.path().join("mod/main.tf"), r#"variable "x" {}"#).unwrap();

    tflens()
        .arg("deps")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("dependency_map"))
        .stdout(predicate::str::contains("mod"));
}

#[test]
fn test_missing_root_directory_fails() {
    tflens()
        .arg("dump")
        .arg("/definitely/not/a/real/path")
        .assert()
        .failure();
}
