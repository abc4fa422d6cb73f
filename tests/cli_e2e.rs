//! End-to-end CLI tests for the litgate binary.
//!
//! Only commands that never reach the network are exercised here.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG_VARS: [&str; 8] = [
    "LITGATE_CACHE_DIR",
    "LITGATE_DOWNLOAD_DIR",
    "LITGATE_ABSTRACT_MODE",
    "LITGATE_FULLTEXT_MODE",
    "LITGATE_EXPORT_MODE",
    "LITGATE_EUTILS_BASE_URL",
    "NCBI_API_KEY",
    "NCBI_EMAIL",
];

/// Binary with a private cache directory and no inherited gateway settings.
fn litgate(cache: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("litgate").unwrap();
    for var in CONFIG_VARS {
        cmd.env_remove(var);
    }
    cmd.env("LITGATE_EUTILS_BASE_URL", "http://127.0.0.1:9")
        .arg("--cache-dir")
        .arg(cache.path());
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    Command::cargo_bin("litgate")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: litgate"));
}

#[test]
fn test_binary_version_displays_version() {
    Command::cargo_bin("litgate")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("litgate"));
}

#[test]
fn test_binary_unknown_subcommand_returns_error() {
    Command::cargo_bin("litgate")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_cache_status_prints_success_envelope() {
    let cache = tempfile::tempdir().unwrap();
    litgate(&cache)
        .arg("cache-status")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""success":true"#))
        .stdout(predicate::str::contains(r#""fulltext_mode":"disabled""#));
}

#[test]
fn test_detect_with_fulltext_disabled_fails() {
    let cache = tempfile::tempdir().unwrap();
    litgate(&cache)
        .args(["detect", "31452104"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""success":false"#))
        .stdout(predicate::str::contains("full-text mode disabled"));
}

#[test]
fn test_export_without_flag_fails() {
    let cache = tempfile::tempdir().unwrap();
    litgate(&cache)
        .args(["export", "31452104"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("export mode disabled"));
}

#[test]
fn test_cache_clear_records_tier() {
    let cache = tempfile::tempdir().unwrap();
    litgate(&cache)
        .args(["cache-clear", "records", "--pretty"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""tier": "records""#));
}
