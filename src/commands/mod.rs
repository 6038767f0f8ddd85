//! Command implementations for the ticket CLI.
//!
//! Each command opens the store for as long as it needs it and returns a
//! result type implementing [`Output`], which `main` prints as JSON or as
//! human-readable text. Commands that run tests take an [`Executor`] so the
//! isolation strategy stays outside this module.

use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::ResolvedConfig;
use crate::models::{LogEntry, Subtask, SubtaskStatus, SummaryEntry, Ticket, TicketInput, now_rfc3339};
use crate::registry::TestRegistry;
use crate::report::render_ticket_report;
use crate::runner::{self, Executor, NextRun, RegistryExecutor, StepOutcome, StopReason, TestRun};
use crate::selector::{blocked_subtasks, find_next_subtask};
use crate::storage::Store;
use crate::suites;
use crate::vault::Vault;
use crate::{Error, Result};

/// Name of the subtask every new ticket starts with.
pub const INITIAL_SUBTASK: &str = "init";

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

fn resolve_ticket_id(store: &Store, ticket_id: Option<&str>) -> Result<String> {
    match ticket_id {
        Some(id) => Ok(id.to_string()),
        None => store.get_current_ticket_id(),
    }
}

// === Ticket lifecycle ===

#[derive(Debug, Serialize)]
pub struct TicketStarted {
    pub ticket_id: String,
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

impl Output for TicketStarted {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.created {
            lines.push(format!("Created ticket {}", self.ticket_id));
        }
        match &self.start_time {
            Some(at) => lines.push(format!("Started ticket {} at {}", self.ticket_id, at)),
            None => lines.push(format!("Current ticket is now {}", self.ticket_id)),
        }
        lines.join("\n")
    }
}

/// Create a ticket (with an `init` subtask) if absent and make it current.
pub fn ticket_add(store_path: &Path, ticket_id: &str) -> Result<TicketStarted> {
    let mut store = Store::open(store_path)?;
    let created = ensure_ticket(&mut store, ticket_id)?;
    store.set_current_ticket(ticket_id)?;
    Ok(TicketStarted {
        ticket_id: ticket_id.to_string(),
        created,
        start_time: None,
    })
}

/// Like [`ticket_add`], also stamping the start and last-summary times.
pub fn ticket_start(store_path: &Path, ticket_id: &str) -> Result<TicketStarted> {
    let mut store = Store::open(store_path)?;
    let created = ensure_ticket(&mut store, ticket_id)?;

    let now = now_rfc3339();
    let mut ticket = store.get_ticket(ticket_id)?;
    ticket.start_time = now.clone();
    ticket.last_summary_time = now.clone();
    store.save_ticket(&ticket)?;
    store.set_current_ticket(ticket_id)?;

    info!(ticket = %ticket_id, "started ticket");
    Ok(TicketStarted {
        ticket_id: ticket_id.to_string(),
        created,
        start_time: Some(now),
    })
}

fn ensure_ticket(store: &mut Store, ticket_id: &str) -> Result<bool> {
    if ticket_id.trim().is_empty() {
        return Err(Error::InvalidInput("ticket id is empty".to_string()));
    }
    if store.ticket_exists(ticket_id)? {
        return Ok(false);
    }
    let mut ticket = Ticket::new(ticket_id);
    let mut init = Subtask::new(INITIAL_SUBTASK);
    init.description = "Initialization".to_string();
    ticket.subtasks.push(init);
    store.save_ticket(&ticket)?;
    Ok(true)
}

#[derive(Debug, Serialize)]
pub struct TicketListItem {
    pub id: String,
    pub current: bool,
}

#[derive(Debug, Serialize)]
pub struct TicketList {
    pub tickets: Vec<TicketListItem>,
    pub count: usize,
}

impl Output for TicketList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.tickets.is_empty() {
            return "No tickets found.".to_string();
        }
        let mut lines = vec![format!("{} ticket(s):", self.count)];
        for t in &self.tickets {
            let marker = if t.current { "*" } else { "-" };
            lines.push(format!("{} {}", marker, t.id));
        }
        lines.join("\n")
    }
}

pub fn ticket_list(store_path: &Path) -> Result<TicketList> {
    let store = Store::open(store_path)?;
    let current = store.current_ticket_id()?;
    let tickets: Vec<TicketListItem> = store
        .list_tickets()?
        .into_iter()
        .map(|id| TicketListItem {
            current: current.as_deref() == Some(id.as_str()),
            id,
        })
        .collect();
    Ok(TicketList {
        count: tickets.len(),
        tickets,
    })
}

#[derive(Debug, Serialize)]
pub struct TicketValidated {
    pub ticket_id: String,
    pub valid: bool,
    pub subtasks: usize,
}

impl Output for TicketValidated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Ticket {} is valid ({} subtasks)",
            self.ticket_id, self.subtasks
        )
    }
}

/// Load a ticket, which runs full validation.
pub fn ticket_validate(store_path: &Path, ticket_id: &str) -> Result<TicketValidated> {
    let ticket = Store::open(store_path)?.get_ticket(ticket_id)?;
    Ok(TicketValidated {
        ticket_id: ticket.id,
        valid: true,
        subtasks: ticket.subtasks.len(),
    })
}

#[derive(Debug, Serialize)]
pub struct TicketUpserted {
    pub ticket_id: String,
    pub created: bool,
    pub subtasks: usize,
}

impl Output for TicketUpserted {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let verb = if self.created { "Created" } else { "Updated" };
        format!("{} ticket {} ({} subtasks)", verb, self.ticket_id, self.subtasks)
    }
}

/// Create or update a ticket from JSON read from `file` (or stdin).
pub fn ticket_upsert(store_path: &Path, file: Option<&Path>) -> Result<TicketUpserted> {
    let raw = match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    upsert_json(store_path, &raw)
}

pub fn upsert_json(store_path: &Path, raw: &str) -> Result<TicketUpserted> {
    let input = TicketInput::from_json(raw)?;
    let mut store = Store::open(store_path)?;
    let existing = if store.ticket_exists(&input.id)? {
        Some(store.get_ticket(&input.id)?)
    } else {
        None
    };
    let created = existing.is_none();
    let ticket = input.apply(existing);
    store.save_ticket(&ticket)?;

    info!(ticket = %ticket.id, created, "upserted ticket");
    Ok(TicketUpserted {
        ticket_id: ticket.id,
        created,
        subtasks: ticket.subtasks.len(),
    })
}

#[derive(Debug, Serialize)]
pub struct TicketDeleted {
    pub ticket_id: String,
}

impl Output for TicketDeleted {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Deleted ticket {}", self.ticket_id)
    }
}

pub fn ticket_delete(store_path: &Path, ticket_id: &str) -> Result<TicketDeleted> {
    Store::open(store_path)?.delete_ticket(ticket_id)?;
    Ok(TicketDeleted {
        ticket_id: ticket_id.to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct TicketDone {
    pub ticket_id: String,
    pub agent_summary: String,
}

impl Output for TicketDone {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Ticket {} completed\n\n{}", self.ticket_id, self.agent_summary.trim_end())
    }
}

/// Finalize the current ticket.
///
/// Every subtask must be done, failed or skipped. The optional `summary` is
/// appended to the history first; the history then becomes the ticket's
/// agent summary.
pub fn ticket_done(store_path: &Path, summary: Option<&str>) -> Result<TicketDone> {
    let mut store = Store::open(store_path)?;
    let ticket_id = store.get_current_ticket_id()?;
    let mut ticket = store.get_ticket(&ticket_id)?;

    if let Some(st) = ticket.subtasks.iter().find(|st| !st.status.is_terminal()) {
        return Err(Error::Validation(format!(
            "subtask {} is still {}; finish it before running 'ticket done'",
            st.name, st.status
        )));
    }

    if let Some(text) = summary.map(str::trim).filter(|s| !s.is_empty()) {
        let last = store.last_summary(&ticket_id)?;
        if last.map(|e| content_hash(&e.content)) != Some(content_hash(text)) {
            store.append_summary(&SummaryEntry {
                ticket_id: ticket_id.clone(),
                subtask_name: None,
                timestamp: now_rfc3339(),
                content: text.to_string(),
            })?;
        }
    }

    let history = store.list_summaries(&ticket_id)?;
    if history.is_empty() {
        return Err(Error::Validation(format!(
            "ticket {} has no summaries; run 'ticket summary add <text>' or pass a final summary",
            ticket_id
        )));
    }

    let mut agent_summary = String::from("## Unified Agent Summary\n\n");
    for entry in &history {
        agent_summary.push_str(&format!(
            "### {} ({})\n{}\n\n",
            entry.timestamp,
            entry.subtask_name.as_deref().unwrap_or("-"),
            entry.content
        ));
    }
    ticket.agent_summary = agent_summary.clone();
    store.save_ticket(&ticket)?;

    info!(ticket = %ticket_id, "ticket completed");
    Ok(TicketDone {
        ticket_id,
        agent_summary,
    })
}

// === Subtasks ===

#[derive(Debug, Serialize)]
pub struct BlockedSubtask {
    pub name: String,
    pub waiting_on: Vec<String>,
}

/// A ticket with the selector's current pick.
#[derive(Debug, Serialize)]
pub struct TicketReport {
    pub ticket: Ticket,
    pub next: Option<String>,
    pub blocked: Vec<BlockedSubtask>,
}

impl TicketReport {
    pub fn new(ticket: Ticket) -> Self {
        let next = find_next_subtask(&ticket).map(|st| st.name.clone());
        let blocked = blocked_subtasks(&ticket)
            .into_iter()
            .map(|(st, deps)| BlockedSubtask {
                name: st.name.clone(),
                waiting_on: deps.into_iter().map(str::to_string).collect(),
            })
            .collect();
        Self {
            ticket,
            next,
            blocked,
        }
    }
}

impl Output for TicketReport {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        render_ticket_report(&self.ticket)
    }
}

pub fn subtask_list(store_path: &Path, ticket_id: &str) -> Result<TicketReport> {
    let ticket = Store::open(store_path)?.get_ticket(ticket_id)?;
    Ok(TicketReport::new(ticket))
}

#[derive(Debug, Serialize)]
pub struct SubtaskUpdated {
    pub ticket_id: String,
    pub subtask: Subtask,
}

impl Output for SubtaskUpdated {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!(
            "Subtask {}/{} is {}",
            self.ticket_id, self.subtask.name, self.subtask.status
        );
        if !self.subtask.agent_notes.is_empty() {
            out.push_str(&format!("\nNotes: {}", self.subtask.agent_notes));
        }
        out
    }
}

/// A manual change to one subtask.
#[derive(Debug, Clone)]
pub enum SubtaskChange {
    /// Mark done and stamp the pass time
    Done,
    /// Mark failed and stamp the fail time, optionally replacing the notes
    Failed { note: Option<String> },
    /// Replace the notes
    Note(String),
    /// Set any status; optionally reset both timestamps
    Status {
        status: SubtaskStatus,
        clear_timestamps: bool,
    },
}

pub fn subtask_update(
    store_path: &Path,
    ticket_id: &str,
    subtask: &str,
    change: SubtaskChange,
) -> Result<SubtaskUpdated> {
    let mut store = Store::open(store_path)?;
    let mut ticket = store.get_ticket(ticket_id)?;
    let st = ticket.require_subtask_mut(subtask)?;
    let now = now_rfc3339();

    match change {
        SubtaskChange::Done => st.mark_passed(&now),
        SubtaskChange::Failed { note } => {
            let note = note.unwrap_or_else(|| st.agent_notes.clone());
            st.mark_failed(&now, &note);
        }
        SubtaskChange::Note(note) => st.agent_notes = note,
        SubtaskChange::Status {
            status,
            clear_timestamps,
        } => {
            st.status = status;
            if clear_timestamps {
                st.pass_timestamp.clear();
                st.fail_timestamp.clear();
            }
        }
    }
    let updated = st.clone();
    store.save_ticket(&ticket)?;

    info!(ticket = %ticket_id, subtask = %updated.name, status = %updated.status, "updated subtask");
    Ok(SubtaskUpdated {
        ticket_id: ticket_id.to_string(),
        subtask: updated,
    })
}

#[derive(Debug, Serialize)]
pub struct SubtaskTested {
    pub ticket_id: String,
    #[serde(flatten)]
    pub step: StepOutcome,
}

impl Output for SubtaskTested {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format_step(&self.step)
    }
}

fn format_step(step: &StepOutcome) -> String {
    if step.passed {
        format!("PASSED  {} ({}ms)", step.subtask, step.duration_ms)
    } else {
        format!("FAILED  {}: {}", step.subtask, step.detail)
    }
}

/// Run one subtask's test in isolation and record the result.
pub fn subtask_test<E: Executor + ?Sized>(
    store_path: &Path,
    ticket_id: &str,
    subtask: &str,
    executor: &E,
) -> Result<SubtaskTested> {
    let step = runner::run_single(store_path, ticket_id, subtask, executor)?;
    Ok(SubtaskTested {
        ticket_id: ticket_id.to_string(),
        step,
    })
}

// === Driver ===

#[derive(Debug, Serialize)]
pub struct NextResult {
    #[serde(flatten)]
    pub run: NextRun,
}

impl Output for NextResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = String::new();
        for step in &self.run.steps {
            out.push_str(&format_step(step));
            out.push('\n');
        }
        match self.run.stopped {
            StopReason::Complete => out.push_str("All subtasks are complete.\n"),
            StopReason::Blocked => out.push_str("No eligible subtasks; remaining work is blocked.\n"),
            StopReason::Failed => {}
            StopReason::Cancelled => out.push_str("Run cancelled.\n"),
        }
        out.push('\n');
        out.push_str(&render_ticket_report(&self.run.ticket));
        out.trim_end().to_string()
    }
}

/// Drive a ticket until nothing is ready or a test fails.
pub fn next<E: Executor + ?Sized>(
    store_path: &Path,
    ticket_id: Option<&str>,
    executor: &E,
) -> Result<NextResult> {
    let run = runner::run_next(store_path, ticket_id, executor)?;
    Ok(NextResult { run })
}

#[derive(Debug, Serialize)]
pub struct TicketTested {
    pub ticket_id: String,
    #[serde(flatten)]
    pub run: TestRun,
}

impl Output for TicketTested {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let status = if self.run.passed { "passed" } else { "failed" };
        let mut out = format!(
            "Tests for {} {} ({}ms)",
            self.ticket_id, status, self.run.duration_ms
        );
        let detail = if self.run.passed {
            self.run.output.trim().to_string()
        } else {
            self.run.detail()
        };
        if !detail.is_empty() {
            out.push('\n');
            out.push_str(&detail);
        }
        out
    }
}

/// Run every registered test for a ticket in one isolated process.
pub fn ticket_test<E: Executor + ?Sized>(
    store_path: &Path,
    ticket_id: &str,
    executor: &E,
) -> Result<TicketTested> {
    let run = runner::run_ticket_tests(store_path, ticket_id, executor)?;
    Ok(TicketTested {
        ticket_id: ticket_id.to_string(),
        run,
    })
}

/// Body of the isolated child: bootstrap the registry and run in-process.
pub fn harness(ticket_id: &str, subtask: Option<&str>) -> Result<TestRun> {
    let registry = TestRegistry::new();
    suites::register_all(&registry);
    let executor = RegistryExecutor::new(&registry);
    match subtask {
        Some(name) => executor.run_subtask(ticket_id, &Subtask::new(name)),
        None => executor.run_ticket(ticket_id),
    }
}

// === Summaries ===

fn content_hash(content: &str) -> Vec<u8> {
    Sha256::digest(content.trim().as_bytes()).to_vec()
}

#[derive(Debug, Serialize)]
pub struct SummaryList {
    pub ticket_id: String,
    pub summaries: Vec<SummaryEntry>,
}

impl Output for SummaryList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("# Agent Summaries for Ticket: {}\n\n", self.ticket_id);
        if self.summaries.is_empty() {
            out.push_str("*No summaries captured yet.*");
            return out;
        }
        for s in &self.summaries {
            out.push_str(&format!(
                "## [{}] {}\n{}\n\n---\n",
                s.timestamp,
                s.subtask_name.as_deref().unwrap_or(""),
                s.content
            ));
        }
        out.trim_end().to_string()
    }
}

pub fn summary_list(store_path: &Path) -> Result<SummaryList> {
    let store = Store::open(store_path)?;
    let ticket_id = store.get_current_ticket_id()?;
    let summaries = store.list_summaries(&ticket_id)?;
    Ok(SummaryList {
        ticket_id,
        summaries,
    })
}

#[derive(Debug, Serialize)]
pub struct SummaryAdded {
    pub entry: SummaryEntry,
}

impl Output for SummaryAdded {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.entry.subtask_name {
            Some(st) => format!("Recorded summary for {} ({})", self.entry.ticket_id, st),
            None => format!("Recorded summary for {}", self.entry.ticket_id),
        }
    }
}

/// Append a summary to the current ticket, tagged with the in-progress
/// subtask. Identical consecutive summaries are rejected.
pub fn summary_add(store_path: &Path, content: &str) -> Result<SummaryAdded> {
    let content = content.trim();
    if content.is_empty() {
        return Err(Error::InvalidInput("summary is empty".to_string()));
    }

    let mut store = Store::open(store_path)?;
    let ticket_id = store.get_current_ticket_id()?;
    let mut ticket = store.get_ticket(&ticket_id)?;

    if let Some(last) = store.last_summary(&ticket_id)? {
        if content_hash(&last.content) == content_hash(content) {
            return Err(Error::InvalidInput(format!(
                "summary is identical to the last one recorded at {}",
                last.timestamp
            )));
        }
    }

    let now = now_rfc3339();
    let entry = SummaryEntry {
        ticket_id: ticket_id.clone(),
        subtask_name: ticket
            .subtasks
            .iter()
            .find(|st| st.status == SubtaskStatus::Progress)
            .map(|st| st.name.clone()),
        timestamp: now.clone(),
        content: content.to_string(),
    };
    store.append_summary(&entry)?;
    ticket.last_summary_time = now;
    store.save_ticket(&ticket)?;

    Ok(SummaryAdded { entry })
}

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub matches: Vec<SummaryEntry>,
    pub count: usize,
}

impl Output for SearchResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.matches.is_empty() {
            return format!("No summaries match \"{}\"", self.query);
        }
        let mut out = format!("{} match(es) for \"{}\":\n", self.count, self.query);
        for r in &self.matches {
            out.push_str(&format!(
                "--- {} | {} | {} ---\n{}\n",
                r.ticket_id,
                r.subtask_name.as_deref().unwrap_or(""),
                r.timestamp,
                r.content
            ));
        }
        out.trim_end().to_string()
    }
}

pub fn search(store_path: &Path, query: &str) -> Result<SearchResult> {
    if query.is_empty() {
        return Err(Error::InvalidInput("search query is empty".to_string()));
    }
    let matches = Store::open(store_path)?.search_summaries(query)?;
    Ok(SearchResult {
        query: query.to_string(),
        count: matches.len(),
        matches,
    })
}

// === Activity log ===

#[derive(Debug, Serialize)]
pub struct LogAdded {
    pub entry: LogEntry,
}

impl Output for LogAdded {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Captured {} in {}", self.entry.entry_type, self.entry.ticket_id)
    }
}

/// Append a `log`, `question` or `ack` entry to the current ticket.
pub fn log_append(
    store_path: &Path,
    entry_type: &str,
    message: &str,
    subtask: Option<&str>,
) -> Result<LogAdded> {
    if message.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{} message is empty", entry_type)));
    }
    let mut store = Store::open(store_path)?;
    let ticket_id = store.get_current_ticket_id()?;
    if let Some(name) = subtask {
        store.get_ticket(&ticket_id)?.require_subtask_mut(name)?;
    }
    let entry = LogEntry {
        ticket_id,
        timestamp: now_rfc3339(),
        entry_type: entry_type.to_string(),
        message: message.to_string(),
        subtask: subtask.map(str::to_string),
    };
    store.append_log(&entry)?;
    Ok(LogAdded { entry })
}

/// Append an `ack` entry to the current ticket.
pub fn ack(store_path: &Path, message: &str) -> Result<LogAdded> {
    let message = match message.trim() {
        "" => "Acknowledged messages",
        text => text,
    };
    log_append(store_path, "ack", message, None)
}

#[derive(Debug, Serialize)]
pub struct LogList {
    pub ticket_id: String,
    pub entries: Vec<LogEntry>,
}

impl Output for LogList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return format!("No activity recorded for {}", self.ticket_id);
        }
        self.entries
            .iter()
            .map(|e| match &e.subtask {
                Some(st) => format!("{} [{}] ({}) {}", e.timestamp, e.entry_type, st, e.message),
                None => format!("{} [{}] {}", e.timestamp, e.entry_type, e.message),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn logs(store_path: &Path, ticket_id: Option<&str>) -> Result<LogList> {
    let store = Store::open(store_path)?;
    let ticket_id = resolve_ticket_id(&store, ticket_id)?;
    if !store.ticket_exists(&ticket_id)? {
        return Err(Error::NotFound(format!(
            "ticket not found: {}; run 'ticket list'",
            ticket_id
        )));
    }
    let entries = store.get_log_entries(&ticket_id)?;
    Ok(LogList { ticket_id, entries })
}

// === Vault ===

#[derive(Debug, Serialize)]
pub struct KeyAdded {
    pub name: String,
}

impl Output for KeyAdded {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Key '{}' stored securely.", self.name)
    }
}

pub fn key_add(store_path: &Path, name: &str, value: &str, password: &str) -> Result<KeyAdded> {
    let mut store = Store::open(store_path)?;
    Vault::new(&mut store).add(name, value, password)?;
    Ok(KeyAdded {
        name: name.to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct KeyList {
    pub keys: Vec<String>,
    pub count: usize,
}

impl Output for KeyList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec!["Stored Keys:".to_string()];
        lines.extend(self.keys.iter().map(|k| format!("- {}", k)));
        lines.join("\n")
    }
}

pub fn key_list(store_path: &Path) -> Result<KeyList> {
    let mut store = Store::open(store_path)?;
    let keys = Vault::new(&mut store).list()?;
    Ok(KeyList {
        count: keys.len(),
        keys,
    })
}

#[derive(Debug, Serialize)]
pub struct KeyRemoved {
    pub name: String,
    pub removed: bool,
}

impl Output for KeyRemoved {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.removed {
            format!("Key '{}' removed.", self.name)
        } else {
            format!("Key '{}' was not stored.", self.name)
        }
    }
}

pub fn key_remove(store_path: &Path, name: &str) -> Result<KeyRemoved> {
    let mut store = Store::open(store_path)?;
    let removed = Vault::new(&mut store).remove(name)?;
    Ok(KeyRemoved {
        name: name.to_string(),
        removed,
    })
}

#[derive(Serialize)]
pub struct KeyLeased {
    pub name: String,
    pub value: String,
}

impl std::fmt::Debug for KeyLeased {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLeased")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Output for KeyLeased {
    fn to_json(&self) -> String {
        json(self)
    }

    /// The bare secret, for shell substitution.
    fn to_human(&self) -> String {
        self.value.clone()
    }
}

pub fn key_lease(store_path: &Path, name: &str, password: &str) -> Result<KeyLeased> {
    let mut store = Store::open(store_path)?;
    let value = Vault::new(&mut store).lease(name, password)?;
    Ok(KeyLeased {
        name: name.to_string(),
        value,
    })
}

// === Config ===

#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ConfigShow {
    pub repo: String,
    pub entries: Vec<ConfigEntry>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Configuration for {}:", self.repo)];
        for e in &self.entries {
            lines.push(format!("  {:<18} {}  ({})", e.key, e.value, e.source));
        }
        lines.join("\n")
    }
}

pub fn config_show(config: &ResolvedConfig) -> ConfigShow {
    let entries = vec![
        ConfigEntry {
            key: "store-path".to_string(),
            value: config.store_path().display().to_string(),
            source: config.store_path.source.to_string(),
        },
        ConfigEntry {
            key: "test-timeout-secs".to_string(),
            value: config.test_timeout_secs.value.to_string(),
            source: config.test_timeout_secs.source.to_string(),
        },
        ConfigEntry {
            key: "output-format".to_string(),
            value: config.output_format().to_string(),
            source: config.output_format.source.to_string(),
        },
    ];
    ConfigShow {
        repo: config.repo.display().to_string(),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_path() -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tickets.db");
        (dir, path)
    }

    #[test]
    fn test_add_creates_init_subtask_and_sets_current() {
        let (_dir, path) = store_path();
        let result = ticket_add(&path, "feature-x").unwrap();
        assert!(result.created);

        let store = Store::open(&path).unwrap();
        assert_eq!(store.get_current_ticket_id().unwrap(), "feature-x");
        let ticket = store.get_ticket("feature-x").unwrap();
        assert_eq!(ticket.subtasks.len(), 1);
        assert_eq!(ticket.subtasks[0].name, INITIAL_SUBTASK);
    }

    #[test]
    fn test_add_existing_ticket_keeps_subtasks() {
        let (_dir, path) = store_path();
        upsert_json(&path, r#"{"id":"t","subtasks":[{"name":"a"},{"name":"b"}]}"#).unwrap();
        let result = ticket_add(&path, "t").unwrap();
        assert!(!result.created);
        assert_eq!(subtask_list(&path, "t").unwrap().ticket.subtasks.len(), 2);
    }

    #[test]
    fn test_start_stamps_times() {
        let (_dir, path) = store_path();
        let result = ticket_start(&path, "t").unwrap();
        let ticket = Store::open(&path).unwrap().get_ticket("t").unwrap();
        assert_eq!(Some(ticket.start_time.clone()), result.start_time);
        assert_eq!(ticket.last_summary_time, ticket.start_time);
    }

    #[test]
    fn test_upsert_updates_existing_ticket() {
        let (_dir, path) = store_path();
        let first = upsert_json(&path, r#"{"id":"t","subtasks":[{"name":"a"}]}"#).unwrap();
        assert!(first.created);
        subtask_update(&path, "t", "a", SubtaskChange::Done).unwrap();

        let second =
            upsert_json(&path, r#"{"id":"t","subtasks":[{"name":"a"},{"name":"b","dependencies":["a"]}]}"#)
                .unwrap();
        assert!(!second.created);
        assert_eq!(second.subtasks, 2);

        let report = subtask_list(&path, "t").unwrap();
        assert_eq!(report.ticket.subtasks[0].status, SubtaskStatus::Done);
        assert_eq!(report.next.as_deref(), Some("b"));
    }

    #[test]
    fn test_upsert_rejects_status_field() {
        let (_dir, path) = store_path();
        let err = upsert_json(&path, r#"{"id":"t","subtasks":[{"name":"a","status":"done"}]}"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(Store::open(&path).unwrap().list_tickets().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_rejects_cycle() {
        let (_dir, path) = store_path();
        let err = upsert_json(
            &path,
            r#"{"id":"t","subtasks":[{"name":"a","dependencies":["b"]},{"name":"b","dependencies":["a"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { .. }));
    }

    #[test]
    fn test_failed_after_done_is_regression() {
        let (_dir, path) = store_path();
        upsert_json(&path, r#"{"id":"t","subtasks":[{"name":"a"}]}"#).unwrap();
        let mut ticket = Store::open(&path).unwrap().get_ticket("t").unwrap();
        ticket.subtasks[0].mark_passed("2026-01-01T00:00:00Z");
        Store::open(&path).unwrap().save_ticket(&ticket).unwrap();

        let err = subtask_update(&path, "t", "a", SubtaskChange::Failed { note: None }).unwrap_err();
        assert!(matches!(err, Error::Regression { .. }));
        assert!(err.to_string().starts_with("[REGRESSION]"));
    }

    #[test]
    fn test_status_with_clear_timestamps() {
        let (_dir, path) = store_path();
        upsert_json(&path, r#"{"id":"t","subtasks":[{"name":"a"}]}"#).unwrap();
        subtask_update(&path, "t", "a", SubtaskChange::Done).unwrap();

        let updated = subtask_update(
            &path,
            "t",
            "a",
            SubtaskChange::Status {
                status: SubtaskStatus::Todo,
                clear_timestamps: true,
            },
        )
        .unwrap();
        assert_eq!(updated.subtask.status, SubtaskStatus::Todo);
        assert!(updated.subtask.pass_timestamp.is_empty());
    }

    #[test]
    fn test_note_unknown_subtask_is_not_found() {
        let (_dir, path) = store_path();
        ticket_add(&path, "t").unwrap();
        let err = subtask_update(&path, "t", "nope", SubtaskChange::Note("x".into())).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_summary_add_tags_progress_subtask_and_rejects_duplicate() {
        let (_dir, path) = store_path();
        ticket_add(&path, "t").unwrap();
        subtask_update(
            &path,
            "t",
            INITIAL_SUBTASK,
            SubtaskChange::Status {
                status: SubtaskStatus::Progress,
                clear_timestamps: false,
            },
        )
        .unwrap();

        let added = summary_add(&path, "found the parser entry point").unwrap();
        assert_eq!(added.entry.subtask_name.as_deref(), Some(INITIAL_SUBTASK));

        let err = summary_add(&path, "  found the parser entry point ").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let ticket = Store::open(&path).unwrap().get_ticket("t").unwrap();
        assert_eq!(ticket.last_summary_time, added.entry.timestamp);
    }

    #[test]
    fn test_done_requires_terminal_subtasks() {
        let (_dir, path) = store_path();
        ticket_add(&path, "t").unwrap();
        let err = ticket_done(&path, Some("wrapped up")).unwrap_err();
        assert!(err.to_string().contains("still todo"));
    }

    #[test]
    fn test_done_composes_agent_summary() {
        let (_dir, path) = store_path();
        ticket_add(&path, "t").unwrap();
        summary_add(&path, "first pass").unwrap();
        subtask_update(&path, "t", INITIAL_SUBTASK, SubtaskChange::Done).unwrap();

        let done = ticket_done(&path, Some("all green")).unwrap();
        assert!(done.agent_summary.starts_with("## Unified Agent Summary"));
        assert!(done.agent_summary.contains("first pass"));
        assert!(done.agent_summary.contains("all green"));

        let ticket = Store::open(&path).unwrap().get_ticket("t").unwrap();
        assert_eq!(ticket.agent_summary, done.agent_summary);
    }

    #[test]
    fn test_done_without_any_summary_fails() {
        let (_dir, path) = store_path();
        ticket_add(&path, "t").unwrap();
        subtask_update(&path, "t", INITIAL_SUBTASK, SubtaskChange::Done).unwrap();
        assert!(ticket_done(&path, None).is_err());
    }

    #[test]
    fn test_log_and_ask_entries() {
        let (_dir, path) = store_path();
        ticket_add(&path, "t").unwrap();
        log_append(&path, "log", "checked the config", None).unwrap();
        log_append(&path, "question", "which port?", Some(INITIAL_SUBTASK)).unwrap();
        assert!(log_append(&path, "question", "?", Some("missing")).is_err());

        let entries = logs(&path, None).unwrap().entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].entry_type, "question");
        assert_eq!(entries[1].subtask.as_deref(), Some(INITIAL_SUBTASK));
    }

    #[test]
    fn test_logs_unknown_ticket() {
        let (_dir, path) = store_path();
        assert!(matches!(logs(&path, Some("ghost")), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_key_commands() {
        let (_dir, path) = store_path();
        key_add(&path, "gh", "ghp_secret", "pw").unwrap();
        assert_eq!(key_list(&path).unwrap().keys, vec!["gh".to_string()]);
        assert_eq!(key_lease(&path, "gh", "pw").unwrap().to_human(), "ghp_secret");
        assert!(matches!(key_lease(&path, "gh", "nope"), Err(Error::InvalidPassword)));
        assert!(key_remove(&path, "gh").unwrap().removed);
        assert!(!key_remove(&path, "gh").unwrap().removed);
    }

    #[test]
    fn test_leased_debug_hides_value() {
        let (_dir, path) = store_path();
        key_add(&path, "gh", "ghp_secret", "pw").unwrap();
        let leased = key_lease(&path, "gh", "pw").unwrap();
        let debug = format!("{:?}", leased);
        assert!(debug.contains("gh"));
        assert!(!debug.contains("ghp_secret"));
    }

    #[test]
    fn test_key_add_rejects_reserved_name() {
        let (_dir, path) = store_path();
        let err = key_add(&path, "list", "v", "pw").unwrap_err();
        assert!(err.to_string().contains("reserved"));
        assert!(key_list(&path).unwrap().keys.is_empty());
    }

    #[test]
    fn test_ack_defaults_message() {
        let (_dir, path) = store_path();
        ticket_add(&path, "t").unwrap();
        ack(&path, "").unwrap();
        ack(&path, "seen the review").unwrap();

        let entries = logs(&path, None).unwrap().entries;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.entry_type == "ack"));
        assert_eq!(entries[0].message, "Acknowledged messages");
        assert_eq!(entries[1].message, "seen the review");
    }

    #[test]
    fn test_ticket_list_marks_current() {
        let (_dir, path) = store_path();
        ticket_add(&path, "a").unwrap();
        ticket_add(&path, "b").unwrap();
        let list = ticket_list(&path).unwrap();
        assert_eq!(list.count, 2);
        assert!(!list.tickets[0].current);
        assert!(list.tickets[1].current);
        assert!(list.to_human().contains("* b"));
    }

    #[test]
    fn test_harness_unknown_test() {
        let err = harness("no-such-ticket", Some("x")).unwrap_err();
        assert!(matches!(err, Error::TestNotRegistered { .. }));
    }

    #[test]
    fn test_harness_runs_selfcheck_suite() {
        let run = harness(suites::selfcheck::TICKET_ID, None).unwrap();
        assert!(run.passed, "{}", run.output);
    }
}
