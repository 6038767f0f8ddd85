//! Stamps the `ticket --version` string with build provenance.
//!
//! Exposes `TICKETBOOK_GIT_COMMIT` (short hash, `-dirty` suffix when the tree
//! has local changes, `unknown` outside a checkout) and
//! `TICKETBOOK_BUILD_TIMESTAMP` (UTC, RFC 3339) to `env!`.

use std::path::Path;
use std::process::Command;

fn main() {
    for watched in [".git/HEAD", ".git/index"] {
        if Path::new(watched).exists() {
            println!("cargo:rerun-if-changed={}", watched);
        }
    }

    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=TICKETBOOK_BUILD_TIMESTAMP={}", built_at);

    let commit = match git(&["rev-parse", "--short", "HEAD"]) {
        Some(hash) if is_dirty() => format!("{}-dirty", hash),
        Some(hash) => hash,
        None => "unknown".to_string(),
    };
    println!("cargo:rustc-env=TICKETBOOK_GIT_COMMIT={}", commit);
}

fn is_dirty() -> bool {
    git(&["status", "--porcelain", "--untracked-files=no"]).is_some_and(|s| !s.is_empty())
}

/// Runs git and returns trimmed stdout, or `None` if git is missing or fails.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}
