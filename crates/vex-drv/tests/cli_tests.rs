//! End-to-end CLI tests for the vex binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn vex() -> Command {
    Command::cargo_bin("vex").unwrap()
}

const CLEAN_VCL: &str = r#"
backend origin { .host = "example.com"; }

sub vcl_recv {
  #FASTLY recv
  set req.http.X-Served-By = "vex";
  return(lookup);
}
"#;

#[test]
fn lint_clean_configuration_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.vcl", CLEAN_VCL);

    vex()
        .arg("lint")
        .arg(dir.path().join("main.vcl"))
        .assert()
        .success()
        .stdout(predicate::str::contains("0 errors, 0 warnings"));
}

#[test]
fn bare_file_argument_defaults_to_lint() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.vcl", CLEAN_VCL);

    vex()
        .arg(dir.path().join("main.vcl"))
        .assert()
        .success()
        .stdout(predicate::str::contains("errors"));
}

#[test]
fn lint_error_exits_nonzero_with_details() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "main.vcl",
        "sub vcl_recv {\n#FASTLY recv\nset req.nonexistent = \"x\";\nreturn(lookup);\n}\n",
    );

    vex()
        .arg("lint")
        .arg(dir.path().join("main.vcl"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 errors"))
        .stderr(predicate::str::contains("undefined-variable"));
}

#[test]
fn warnings_only_shown_with_verbose() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "main.vcl",
        "sub vcl_recv {\n#FASTLY recv\nset req.http.X = digest.hash_md5(\"a\");\nreturn(lookup);\n}\n",
    );

    vex()
        .arg("lint")
        .arg(dir.path().join("main.vcl"))
        .assert()
        .success()
        .stderr(predicate::str::contains("unimplemented-builtin").not());

    vex()
        .arg("lint")
        .arg("-v")
        .arg(dir.path().join("main.vcl"))
        .assert()
        .success()
        .stderr(predicate::str::contains("unimplemented-builtin"));
}

#[test]
fn include_path_flag_resolves_modules() {
    let main_dir = tempfile::tempdir().unwrap();
    let inc_dir = tempfile::tempdir().unwrap();
    write(main_dir.path(), "main.vcl", "include \"shared\";\nsub vcl_recv {\n#FASTLY recv\nreturn(lookup);\n}\n");
    write(inc_dir.path(), "shared.vcl", "backend origin { .host = \"o\"; }\n");

    vex()
        .arg("lint")
        .arg("-I")
        .arg(inc_dir.path())
        .arg(main_dir.path().join("main.vcl"))
        .assert()
        .success();
}

#[test]
fn missing_include_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.vcl", "include \"nowhere\";\n");

    vex()
        .arg("lint")
        .arg(dir.path().join("main.vcl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn stats_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.vcl", CLEAN_VCL);

    vex()
        .arg("stats")
        .arg(dir.path().join("main.vcl"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Subroutines"))
        .stdout(predicate::str::contains("Backends"));
}

#[test]
fn stats_json_output() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.vcl", CLEAN_VCL);

    let output = vex()
        .arg("stats")
        .arg(dir.path().join("main.vcl"))
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed["subroutines"], 1);
    assert_eq!(parsed["backends"], 1);
    assert_eq!(parsed["files"], 1);
}

#[test]
fn run_prints_response_and_log() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "main.vcl",
        r#"
backend origin { .host = "example.com"; }

sub vcl_recv {
  #FASTLY recv
  if (req.url ~ "^/teapot") {
    error 418 "teapot";
  }
  return(lookup);
}

sub vcl_error {
  #FASTLY error
  synthetic {"short and stout"};
  return(deliver);
}
"#,
    );

    vex()
        .arg("run")
        .arg(dir.path().join("main.vcl"))
        .arg("--url")
        .arg("/teapot")
        .assert()
        .success()
        .stdout(predicate::str::contains("HTTP/1.1 418 teapot"))
        .stdout(predicate::str::contains("short and stout"));
}

#[test]
fn run_refuses_configuration_with_lint_errors() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "main.vcl", "sub vcl_recv {\n#FASTLY recv\nreturn(deliver);\n}\n");

    vex()
        .arg("run")
        .arg(dir.path().join("main.vcl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("refusing to run"));
}

#[test]
fn version_flag() {
    vex()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
