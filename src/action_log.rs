//! Command audit trail.
//!
//! Every ticket-scoped CLI invocation is appended to that ticket's activity
//! log as a `command` entry carrying sanitized arguments, outcome and
//! duration. Auditing never fails a command.

use crate::models::{LogEntry, now_rfc3339};
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Log entry type used for command audit records.
pub const COMMAND_ENTRY_TYPE: &str = "command";

/// Payload stored as the message of a `command` log entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Command name (e.g., "subtask done", "next")
    pub command: String,

    /// Sanitized command arguments
    pub args: serde_json::Value,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    /// User who executed the command
    pub user: String,
}

/// Record a command against a ticket's activity log.
///
/// `ticket_id` defaults to the current ticket; nothing is recorded when
/// neither names an existing ticket.
pub fn log_command(
    store_path: &Path,
    ticket_id: Option<&str>,
    command: &str,
    args: serde_json::Value,
    success: bool,
    error: Option<String>,
    duration_ms: u64,
) {
    let mut store = match Store::open(store_path) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, command, "skipping command audit: store unavailable");
            return;
        }
    };

    let ticket_id = match ticket_id {
        Some(id) => id.to_string(),
        None => match store.current_ticket_id() {
            Ok(Some(id)) => id,
            _ => return,
        },
    };
    if !matches!(store.ticket_exists(&ticket_id), Ok(true)) {
        debug!(ticket = %ticket_id, command, "no ticket to audit against");
        return;
    }

    let record = CommandRecord {
        command: command.to_string(),
        args: sanitize_args(&args),
        success,
        error,
        duration_ms,
        user: get_current_user(),
    };
    let message = match serde_json::to_string(&record) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to serialize command audit record");
            return;
        }
    };

    let entry = LogEntry {
        ticket_id,
        timestamp: now_rfc3339(),
        entry_type: COMMAND_ENTRY_TYPE.to_string(),
        message,
        subtask: args
            .get("subtask")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    };
    if let Err(e) = store.append_log(&entry) {
        warn!(error = %e, "failed to write command audit record");
    }
}

/// Sanitize arguments to remove sensitive data.
pub fn sanitize_args(args: &serde_json::Value) -> serde_json::Value {
    match args {
        serde_json::Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, value) in map {
                let key_lower = key.to_lowercase();
                if key_lower.contains("password")
                    || key_lower.contains("secret")
                    || key_lower.contains("token")
                    || key_lower.contains("value")
                {
                    sanitized.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    sanitized.insert(key.clone(), sanitize_args(value));
                }
            }
            serde_json::Value::Object(sanitized)
        }
        serde_json::Value::Array(arr) => {
            if arr.len() > 10 {
                serde_json::Value::String(format!("[Array with {} items]", arr.len()))
            } else {
                serde_json::Value::Array(arr.iter().map(sanitize_args).collect())
            }
        }
        serde_json::Value::String(s) => {
            let sanitized = if s.contains('/') || s.contains('\\') {
                s.rsplit(['/', '\\']).next().unwrap_or(s).to_string()
            } else {
                s.clone()
            };

            if sanitized.chars().count() > 100 {
                let head: String = sanitized.chars().take(97).collect();
                serde_json::Value::String(format!(
                    "{}... ({} chars)",
                    head,
                    sanitized.chars().count()
                ))
            } else {
                serde_json::Value::String(sanitized)
            }
        }
        _ => args.clone(),
    }
}

fn get_current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
