//! Data models for ticketbook entities.
//!
//! This module defines the core data structures:
//! - `Ticket` - A unit of work made of ordered subtasks
//! - `Subtask` - An independently testable step with status and dependencies
//! - `SummaryEntry` - Append-only narrative log used for search
//! - `LogEntry` - Append-only activity audit trail
//! - `KeyEntry` - An encrypted vault secret
//! - `TicketInput` - Structured upsert input (no engine-owned fields)

pub mod graph;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Subtask status in the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtaskStatus {
    #[default]
    Todo,
    Progress,
    Done,
    Failed,
    Skipped,
}

impl SubtaskStatus {
    /// Parse a stored status string. The empty string means `todo`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "" | "todo" => Some(Self::Todo),
            "progress" => Some(Self::Progress),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Progress => "progress",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Whether a dependent subtask may proceed past this one.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped)
    }

    /// Whether no further work is expected on this subtask.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An atomic, independently testable step within a ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Name, unique within the ticket
    pub name: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Names of sibling subtasks that must be done or skipped first
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub description: String,

    /// Natural-language acceptance statements, in order
    #[serde(default)]
    pub test_conditions: Vec<String>,

    /// Optional shell command run instead of the registered test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,

    /// Last failure reason or free-form note
    #[serde(default)]
    pub agent_notes: String,

    /// RFC 3339, or empty
    #[serde(default)]
    pub pass_timestamp: String,

    /// RFC 3339, or empty
    #[serde(default)]
    pub fail_timestamp: String,

    #[serde(default)]
    pub status: SubtaskStatus,
}

impl Subtask {
    /// Create a new `todo` subtask with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: SubtaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Record a passing run.
    pub fn mark_passed(&mut self, at: &str) {
        self.status = SubtaskStatus::Done;
        self.pass_timestamp = at.to_string();
    }

    /// Record a failing run with its detail.
    pub fn mark_failed(&mut self, at: &str, detail: &str) {
        self.status = SubtaskStatus::Failed;
        self.fail_timestamp = at.to_string();
        self.agent_notes = detail.to_string();
    }
}

/// A unit of work tracked by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Primary key, typically a branch-style slug
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub description: String,

    /// Ordered; position is persisted
    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    #[serde(default)]
    pub agent_summary: String,

    #[serde(default)]
    pub start_time: String,

    #[serde(default)]
    pub last_summary_time: String,
}

impl Ticket {
    /// Create an empty ticket whose name defaults to its id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    pub fn subtask(&self, name: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|st| st.name == name)
    }

    pub fn subtask_mut(&mut self, name: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|st| st.name == name)
    }

    /// Look up a subtask or fail with an actionable not-found error.
    pub fn require_subtask_mut(&mut self, name: &str) -> crate::Result<&mut Subtask> {
        let ticket_id = self.id.clone();
        self.subtask_mut(name).ok_or_else(|| {
            crate::Error::NotFound(format!(
                "subtask '{}' not found in ticket {}; run 'ticket subtask list {}'",
                name, ticket_id, ticket_id
            ))
        })
    }

    /// Count subtasks per status, in enum order.
    pub fn status_counts(&self) -> Vec<(SubtaskStatus, usize)> {
        [
            SubtaskStatus::Todo,
            SubtaskStatus::Progress,
            SubtaskStatus::Done,
            SubtaskStatus::Failed,
            SubtaskStatus::Skipped,
        ]
        .into_iter()
        .map(|s| (s, self.subtasks.iter().filter(|st| st.status == s).count()))
        .collect()
    }
}

/// Append-only narrative entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub ticket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask_name: Option<String>,
    pub timestamp: String,
    pub content: String,
}

/// Append-only activity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub ticket_id: String,
    pub timestamp: String,
    /// e.g. "command", "log", "question", "test"
    pub entry_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask: Option<String>,
}

/// A stored vault secret. Never carries plaintext or the derived key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub name: String,
    /// Ciphertext with the GCM tag appended
    pub encrypted_value: Vec<u8>,
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("name", &self.name)
            .field("encrypted_value", &format_args!("<{} bytes>", self.encrypted_value.len()))
            .finish_non_exhaustive()
    }
}

/// Ticket as accepted by `ticket upsert`.
///
/// Status and timestamps are engine-owned and are rejected before this type
/// is deserialized (see [`TicketInput::from_json`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicketInput {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtasks: Vec<SubtaskInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtaskInput {
    pub name: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "testConditions")]
    pub test_conditions: Vec<String>,
    #[serde(default, alias = "testCommand")]
    pub test_command: Option<String>,
}

/// Field names the engine owns; upsert input may not set them.
const ENGINE_OWNED_FIELDS: &[&str] = &[
    "status",
    "pass_timestamp",
    "passTimestamp",
    "fail_timestamp",
    "failTimestamp",
];

impl TicketInput {
    /// Parse upsert input, rejecting engine-owned fields anywhere in it.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if let Some(path) = find_engine_owned_field(&value, "$") {
            return Err(crate::Error::InvalidInput(format!(
                "{} is engine-owned and cannot be set via upsert",
                path
            )));
        }
        let input: TicketInput = serde_json::from_value(value)
            .map_err(|e| crate::Error::InvalidInput(e.to_string()))?;
        if input.id.trim().is_empty() {
            return Err(crate::Error::InvalidInput("ticket id is empty".to_string()));
        }
        Ok(input)
    }

    /// Merge this input onto an existing ticket (or a fresh one).
    ///
    /// Subtasks are matched by name; engine-owned state of kept subtasks
    /// survives, new subtasks start as `todo`, omitted subtasks are dropped.
    pub fn apply(self, existing: Option<Ticket>) -> Ticket {
        let mut ticket = existing.unwrap_or_else(|| Ticket::new(self.id.clone()));
        let previous = std::mem::take(&mut ticket.subtasks);

        ticket.name = self.name.unwrap_or_else(|| self.id.clone());
        ticket.tags = self.tags;
        ticket.description = self.description;
        ticket.subtasks = self
            .subtasks
            .into_iter()
            .map(|input| {
                let mut st = previous
                    .iter()
                    .find(|old| old.name == input.name)
                    .cloned()
                    .unwrap_or_else(|| Subtask::new(input.name.clone()));
                st.tags = input.tags;
                st.dependencies = input.dependencies;
                st.description = input.description;
                st.test_conditions = input.test_conditions;
                st.test_command = input.test_command.filter(|c| !c.trim().is_empty());
                st
            })
            .collect();
        ticket
    }
}

fn find_engine_owned_field(value: &serde_json::Value, path: &str) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => map.iter().find_map(|(key, child)| {
            let child_path = format!("{}.{}", path, key);
            if ENGINE_OWNED_FIELDS.contains(&key.as_str()) {
                Some(child_path)
            } else {
                find_engine_owned_field(child, &child_path)
            }
        }),
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, child)| find_engine_owned_field(child, &format!("{}[{}]", path, i))),
        _ => None,
    }
}

/// Current time as an RFC 3339 UTC string with second precision.
pub fn now_rfc3339() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 timestamp; `None` for empty or malformed input.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s.trim().is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_treats_empty_as_todo() {
        assert_eq!(SubtaskStatus::parse(""), Some(SubtaskStatus::Todo));
        assert_eq!(SubtaskStatus::parse("progress"), Some(SubtaskStatus::Progress));
        assert_eq!(SubtaskStatus::parse("skipped"), Some(SubtaskStatus::Skipped));
        assert_eq!(SubtaskStatus::parse("in_progress"), None);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SubtaskStatus::Progress).unwrap();
        assert_eq!(json, "\"progress\"");
    }

    #[test]
    fn test_upsert_rejects_nested_status() {
        let raw = r#"{"id":"t","subtasks":[{"name":"a","status":"done"}]}"#;
        let err = TicketInput::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("$.subtasks[0].status"));
    }

    #[test]
    fn test_upsert_rejects_camel_case_timestamps() {
        let raw = r#"{"id":"t","subtasks":[{"name":"a","passTimestamp":"2026-01-01T00:00:00Z"}]}"#;
        assert!(matches!(
            TicketInput::from_json(raw),
            Err(crate::Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_upsert_rejects_empty_id() {
        assert!(TicketInput::from_json(r#"{"id":"  "}"#).is_err());
    }

    #[test]
    fn test_upsert_apply_preserves_engine_state() {
        let mut existing = Ticket::new("t");
        let mut done = Subtask::new("a");
        done.mark_passed("2026-01-01T00:00:00Z");
        existing.subtasks.push(done);
        existing.start_time = "2026-01-01T00:00:00Z".to_string();

        let input = TicketInput::from_json(
            r#"{"id":"t","name":"Tee","subtasks":[{"name":"a","description":"first"},{"name":"b","dependencies":["a"]}]}"#,
        )
        .unwrap();
        let ticket = input.apply(Some(existing));

        assert_eq!(ticket.name, "Tee");
        assert_eq!(ticket.start_time, "2026-01-01T00:00:00Z");
        assert_eq!(ticket.subtasks[0].status, SubtaskStatus::Done);
        assert_eq!(ticket.subtasks[0].description, "first");
        assert_eq!(ticket.subtasks[0].pass_timestamp, "2026-01-01T00:00:00Z");
        assert_eq!(ticket.subtasks[1].status, SubtaskStatus::Todo);
        assert_eq!(ticket.subtasks[1].dependencies, vec!["a".to_string()]);
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        let ts = parse_timestamp("2026-03-01T10:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(ts), "2026-03-01T08:00:00Z");
    }

    #[test]
    fn test_key_entry_debug_hides_bytes() {
        let key = KeyEntry {
            name: "k".to_string(),
            encrypted_value: vec![1, 2, 3],
            salt: vec![0; 16],
            nonce: vec![0; 12],
        };
        let debug = format!("{:?}", key);
        assert!(debug.contains("<3 bytes>"));
        assert!(!debug.contains("[1, 2, 3]"));
    }
}
