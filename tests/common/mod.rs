//! Common test utilities for ticket integration tests.
//!
//! Provides `TestEnv` for isolated test environments that never touch a real
//! project's `tickets/` store or the user's config directory.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with isolated storage.
///
/// Each `TestEnv` creates two temporary directories:
/// - `repo_dir`: Acts as the project root (and holds the store)
/// - `config_dir`: Empty system config directory (via `TICKET_CONFIG_DIR`)
///
/// The `ticket()` method returns a `Command` that sets `TICKET_DB_PATH`
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub repo_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            repo_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the ticket binary with an isolated store.
    pub fn ticket(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_ticket"));
        cmd.current_dir(self.repo_dir.path());
        cmd.env("TICKET_DB_PATH", self.db_path());
        cmd.env("TICKET_CONFIG_DIR", self.config_dir.path());
        cmd.env_remove("TICKET_REPO");
        cmd.env_remove("TICKET_TEST_TIMEOUT_SECS");
        cmd.env_remove("TICKET_LOG");
        cmd
    }

    pub fn repo_path(&self) -> &Path {
        self.repo_dir.path()
    }

    pub fn db_path(&self) -> PathBuf {
        self.repo_dir.path().join("tickets").join("tickets.db")
    }

    /// Upsert a ticket from JSON via stdin, asserting success.
    pub fn upsert(&self, json: &str) {
        self.ticket()
            .arg("upsert")
            .write_stdin(json.to_string())
            .assert()
            .success();
    }

    /// Run a command expected to succeed and parse its JSON output.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.ticket().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "ticket {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
