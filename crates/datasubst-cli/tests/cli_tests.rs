//! Integration tests for the `datasubst` binary

#![allow(deprecated)] // cargo_bin is deprecated in favour of the cargo_bin! macro

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Command with a clean delimiter environment.
fn datasubst() -> Command {
    let mut cmd = Command::cargo_bin("datasubst").unwrap();
    cmd.env_remove("DATASUBST_DELIMS");
    cmd
}

/// Helper to write a file into the temp dir and return its path as a string
fn write_file(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.display().to_string()
}

#[test]
fn test_json_from_stdin_to_stdout() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", r#"{"name": "World"}"#);

    datasubst()
        .args(["--json-data", &data])
        .write_stdin("Hello, {{ .name }}!")
        .assert()
        .success()
        .stdout("Hello, World!");
}

#[test]
fn test_input_and_output_files() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.yaml", "items: [a, b]\n");
    let input = write_file(&dir, "list.tmpl", "{{ range .items }}- {{ . }}\n{{ end }}");
    let output = dir.path().join("out.txt");

    datasubst()
        .args(["-y", &data, "-i", &input, "-o"])
        .arg(&output)
        .assert()
        .success()
        .stdout("");

    assert_eq!(fs::read_to_string(&output).unwrap(), "- a\n- b\n");
}

#[test]
fn test_dash_means_stdio() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", r#"{"n": 3}"#);

    datasubst()
        .args(["-j", &data, "-i", "-", "-o", "-"])
        .write_stdin("n={{ .n }}")
        .assert()
        .success()
        .stdout("n=3");
}

#[test]
fn test_missing_key_default_and_strict() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", "{}");

    datasubst()
        .args(["-j", &data])
        .write_stdin("[{{ .missing }}]")
        .assert()
        .success()
        .stdout("[]");

    datasubst()
        .args(["-j", &data, "--strict"])
        .write_stdin("[{{ .missing }}]")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("no entry for key \"missing\""));
}

#[test]
fn test_environment_data() {
    datasubst()
        .arg("--env-data")
        .env("TEST1", "hello")
        .env("TEST2", "world")
        .write_stdin("{{ .TEST1 }} {{ .TEST2 }}")
        .assert()
        .success()
        .stdout("hello world");
}

#[test]
fn test_yaml_subtree() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.yaml", "key1: v1\nkey2:\n  first:\n    key3: v3\n");

    datasubst()
        .args(["-y", &data, "-p", ".key2"])
        .write_stdin("{{ .first.key3 }}")
        .assert()
        .success()
        .stdout("v3");
}

#[test]
fn test_unresolvable_subtree_fails() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.yaml", "key2:\n  first: 1\n");

    datasubst()
        .args(["-y", &data, "--subtree", ".key2.second"])
        .write_stdin("x")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("at segment 'second'"));
}

#[test]
fn test_custom_delimiters_flag_and_env() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", r#"{"a": "x"}"#);

    datasubst()
        .args(["-j", &data, "-d", "((:))"])
        .write_stdin("(( .a )) {{ .a }}")
        .assert()
        .success()
        .stdout("x {{ .a }}");

    datasubst()
        .args(["-j", &data])
        .env("DATASUBST_DELIMS", "[[:]]")
        .write_stdin("[[ .a ]]")
        .assert()
        .success()
        .stdout("x");
}

#[test]
fn test_invalid_delimiters() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", "{}");

    datasubst()
        .args(["-j", &data, "-d", "(("])
        .write_stdin("x")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid delimiters '(('"));
}

#[test]
fn test_data_source_is_required() {
    datasubst()
        .write_stdin("x")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_data_sources_are_exclusive() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", "{}");

    datasubst()
        .args(["-j", &data, "-e"])
        .write_stdin("x")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_subtree_with_env_is_usage_error() {
    datasubst()
        .args(["-e", "-p", ".a"])
        .write_stdin("x")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("subtree path cannot be used with environment data"));
}

#[test]
fn test_output_not_created_on_failure() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", "{}");
    let output = dir.path().join("never.txt");

    datasubst()
        .args(["-j", &data, "-s", "-o"])
        .arg(&output)
        .write_stdin("{{ .gone }}")
        .assert()
        .failure();

    assert!(!output.exists());
}

#[test]
fn test_missing_data_file_is_named() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.json");

    datasubst()
        .arg("-j")
        .arg(&missing)
        .write_stdin("x")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read JSON data file"))
        .stderr(predicate::str::contains("absent.json"));
}

#[test]
fn test_malformed_json_reports_file() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "broken.json", "{\"a\": ");

    datasubst()
        .args(["-j", &data])
        .write_stdin("x")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("broken.json"))
        .stderr(predicate::str::contains("failed to decode JSON data"));
}

#[test]
fn test_parse_error_is_reported() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", "{}");

    datasubst()
        .args(["-j", &data])
        .write_stdin("ok\n{{ if .a }}")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("template: template:2: unexpected EOF"));
}

#[test]
fn test_deeply_nested_template_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let data = write_file(&dir, "data.json", "{}");
    let template = format!("{}x{}", "{{ if true }}".repeat(2000), "{{ end }}".repeat(2000));

    datasubst()
        .args(["-j", &data])
        .write_stdin(template)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max nesting depth exceeded"));
}

#[test]
fn test_version() {
    datasubst()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("datasubst "));
}
