//! Smoke tests for the ticket CLI.
//!
//! These tests verify basic CLI functionality:
//! - `ticket --version` outputs version info
//! - `ticket --help` outputs help text without the hidden harness
//! - errors are JSON by default and plain text with `-H`

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_version_flag() {
    TestEnv::new()
        .ticket()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ticket"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    TestEnv::new()
        .ticket()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("__harness").not());
}

#[test]
fn test_error_is_json_by_default() {
    TestEnv::new()
        .ticket()
        .args(["validate", "ghost"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("{\"error\":"));
}

#[test]
fn test_error_is_plain_with_human_flag() {
    TestEnv::new()
        .ticket()
        .args(["validate", "ghost", "-H"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: ticket not found: ghost"));
}

#[test]
fn test_missing_repo_path_fails() {
    TestEnv::new()
        .ticket()
        .args(["list", "-C", "/definitely/not/here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
