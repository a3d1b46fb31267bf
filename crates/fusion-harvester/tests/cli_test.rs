//! Integration tests for the `fusion-harvester` binary.
//!
//! Argument parsing, offline normalization, configuration commands and
//! error exit codes. Nothing here talks to a portal.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

// ── Helpers ─────────────────────────────────────────────────────────

/// Command with env isolation: no `FUSION_*` variables, config dirs
/// pointing at a path that does not exist.
fn fusion_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fusion-harvester");
    cmd.env("HOME", "/tmp/fusion-harvester-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/fusion-harvester-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("FUSION_CONFIG")
        .env_remove("FUSION_USERNAME")
        .env_remove("FUSION_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = fusion_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    fusion_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("FusionSolar")
            .and(predicate::str::contains("run"))
            .and(predicate::str::contains("discover"))
            .and(predicate::str::contains("normalize")),
    );
}

#[test]
fn test_version_flag() {
    fusion_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fusion-harvester"));
}

#[test]
fn test_completions_bash() {
    fusion_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    fusion_cmd()
        .args(["--config", "/etc/fusion/custom.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/etc/fusion/custom.toml"));
}

#[test]
fn test_config_show_masks_password() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "config.toml",
        r#"
[portal]
url = "https://region01.example.com"

[credentials]
username = "ops"
password = "hunter2"
"#,
    );

    fusion_cmd()
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("region01.example.com")
                .and(predicate::str::contains("ops"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_missing_config_file_is_a_config_error() {
    fusion_cmd()
        .args(["--config", "/nonexistent/fusion.toml", "config", "show"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

// ── Harvest preconditions ───────────────────────────────────────────

#[test]
fn test_once_without_sites_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "config.toml", "[harvest]\ninterval = \"5m\"\n");

    fusion_cmd()
        .arg("--config")
        .arg(&config)
        .arg("once")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("No sites configured"));
}

#[test]
fn test_once_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "config.toml",
        "[[sites]]\nid = \"NE=1\"\nname = \"Plant A\"\n",
    );

    fusion_cmd()
        .arg("--config")
        .arg(&config)
        .arg("once")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("credentials"));
}

// ── Offline normalization ───────────────────────────────────────────

#[test]
fn test_normalize_meter_payload() {
    let dir = tempfile::tempdir().unwrap();
    let signals = write(
        dir.path(),
        "signals.toml",
        "[meter]\n\"10004\" = \"active_power_kw\"\n",
    );
    let payload = write(
        dir.path(),
        "meter.json",
        r#"{"data": [{"id": 10004, "name": "Active power", "value": "5000"}]}"#,
    );

    let output = fusion_cmd()
        .args(["normalize", "--kind", "meter", "--name", "Grid Meter", "--dn", "NE=12"])
        .arg("--signals")
        .arg(&signals)
        .arg(&payload)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);

    let record: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(record["measurement"], "meter");
    assert_eq!(record["name"], "Grid Meter");
    assert_eq!(record["fields"]["active_power_kw"].as_f64(), Some(5.0));
    assert_eq!(record["fields"]["phase_a_voltage_v"].as_f64(), Some(0.0));
}

#[test]
fn test_normalize_writes_to_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write(
        dir.path(),
        "strings.json",
        r#"{"data": {"signals": {"11001": {"value": "610"}, "14001": {"value": "1"}}}}"#,
    );
    let out = dir.path().join("records.jsonl");

    fusion_cmd()
        .args(["normalize", "--kind", "strings"])
        .arg("--output")
        .arg(&out)
        .arg(&payload)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let text = std::fs::read_to_string(&out).unwrap();
    let record: Value = serde_json::from_str(text.trim()).unwrap();
    assert_eq!(record["fields"]["pv01_voltage"].as_f64(), Some(610.0));
}

#[test]
fn test_normalize_rejects_unknown_kind() {
    let output = fusion_cmd()
        .args(["normalize", "--kind", "battery", "payload.json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("unknown kind"));
}

#[test]
fn test_normalize_invalid_json() {
    let dir = tempfile::tempdir().unwrap();
    let payload = write(dir.path(), "broken.json", "{ not json");

    fusion_cmd()
        .args(["normalize", "--kind", "sensor"])
        .arg(&payload)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid JSON"));
}
