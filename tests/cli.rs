//! CLI test cases.
//!
//! These run the real binary against the fixtures in `tests/fixtures`, so
//! they must be run from the crate root (which `cargo test` does for us).

use assert_cmd::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("ocr-fields").unwrap()
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_map_sequential_jsonl_input() {
    cmd()
        .arg("map")
        .arg("tests/fixtures/input.jsonl")
        .arg("--config")
        .arg("tests/fixtures/configs/sequential.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#""fields":{"first_name":{"text":"Jane""#,
        ))
        .stdout(predicate::str::contains(r#""last_name":{"text":"Doe""#))
        .stdout(predicate::str::contains(
            r#""birth_date":{"text":"1990-04-01""#,
        ))
        .stdout(predicate::str::contains("smudge").not())
        .stdout(predicate::str::contains(r#""page 1: no text detected""#));
}

#[test]
fn test_map_positional_csv_input() {
    cmd()
        .arg("map")
        .arg("tests/fixtures/input.csv")
        .arg("-c")
        .arg("tests/fixtures/configs/positional.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""mode":"positional""#))
        .stdout(predicate::str::contains(r#""first_name":{"text":"Jane""#))
        .stdout(predicate::str::contains(r#""fields_mapped":3,"fields_expected":4"#));
}

#[test]
fn test_map_from_stdin() {
    cmd()
        .arg("map")
        .arg("-c")
        .arg("tests/fixtures/configs/sequential.toml")
        .write_stdin(r#"{"id": 1, "path": "tests/fixtures/detections/form.json"}"#)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(r#"{"id":1,"status":"ok""#));
}

#[test]
fn test_confidence_flag_overrides_config() {
    cmd()
        .arg("map")
        .arg("tests/fixtures/input.jsonl")
        .arg("-c")
        .arg("tests/fixtures/configs/sequential.toml")
        .arg("--confidence")
        .arg("0.1")
        .assert()
        .success()
        .stdout(predicate::str::contains("smudge"));
}

#[test]
fn test_take_first() {
    cmd()
        .arg("map")
        .arg("tests/fixtures/input.jsonl")
        .arg("-c")
        .arg("tests/fixtures/configs/sequential.toml")
        .arg("--take-first")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id":"blank""#).not());
}

#[test]
fn test_bogus_mode_fails_before_reading_input() {
    cmd()
        .arg("map")
        .arg("tests/fixtures/does-not-exist.jsonl")
        .arg("-c")
        .arg("tests/fixtures/configs/bogus_mode.toml")
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("unknown box mapping mode \"diagonal\""));
}

#[test]
fn test_missing_sequential_fields_fails() {
    cmd()
        .arg("map")
        .arg("tests/fixtures/input.jsonl")
        .arg("-c")
        .arg("tests/fixtures/configs/missing_fields.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sequential_fields is missing"));
}

#[test]
fn test_missing_document_respects_failure_rate() {
    cmd()
        .arg("map")
        .arg("tests/fixtures/input_with_missing.jsonl")
        .arg("-c")
        .arg("tests/fixtures/configs/sequential.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("of outputs were failures"));

    cmd()
        .arg("map")
        .arg("tests/fixtures/input_with_missing.jsonl")
        .arg("-c")
        .arg("tests/fixtures/configs/sequential.toml")
        .arg("--allowed-failure-rate")
        .arg("0.5")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id":"gone","status":"failed""#));
}

#[test]
fn test_summary_written() {
    let dir = tempfile::TempDir::new().unwrap();
    let output_path = dir.path().join("output.jsonl");
    let summary_path = dir.path().join("summary.txt");
    cmd()
        .arg("map")
        .arg("tests/fixtures/input.jsonl")
        .arg("-c")
        .arg("tests/fixtures/configs/positional.toml")
        .arg("-o")
        .arg(&output_path)
        .arg("--summary")
        .arg(&summary_path)
        .assert()
        .success();

    let output = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(output.lines().count(), 2);

    let summary = std::fs::read_to_string(&summary_path).unwrap();
    assert!(summary.contains("first_name: Jane (confidence: 0.95)"));
    assert!(summary.contains("signature: [Not detected]"));
    assert!(summary.contains("Warning: page 1: no text detected"));
    assert!(summary.contains(
        "    All detected text:\n      1. \"Jane\" (confidence: 0.95) at [100, 90, 200, 110]\n"
    ));
    assert!(!summary.contains("smudge"));
}

#[test]
fn test_schema_types() {
    for schema_type in ["DocumentInput", "DocumentOutput", "Detections", "Config"] {
        cmd()
            .arg("schema")
            .arg(schema_type)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""$schema""#));
    }
}
