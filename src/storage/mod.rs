//! Storage layer for ticketbook data.
//!
//! Everything lives in one SQLite file: tickets and their ordered subtasks,
//! the append-only summary and activity logs, the current-ticket pointer and
//! the vault's encrypted keys.
//!
//! ## Single writer
//!
//! A [`Store`] holds an exclusive lock on the file for as long as it is open.
//! A second process (or a second `Store` in the same process) opening the
//! same file gets [`Error::StoreBusy`]. Keep a `Store` open only for the span
//! of one command step and drop it before handing the file to a child process.

mod schema;

use crate::models::{KeyEntry, LogEntry, Subtask, SummaryEntry, Ticket};
use crate::validation::{parse_status, validate_ticket};
use crate::{Error, Result};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// How long to wait on a lock held by another connection before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_millis(200);

/// `ticket_meta` key holding the current ticket id.
const CURRENT_TICKET_KEY: &str = "current_ticket";

/// Default store location relative to the project root.
pub fn default_store_path(repo_path: &Path) -> PathBuf {
    repo_path.join("tickets").join("tickets.db")
}

/// Walk up from `start` to the nearest directory that holds a ticket store,
/// a `tickets/config.kdl`, or a `.git` directory.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| {
            default_store_path(dir).is_file()
                || dir.join("tickets").join("config.kdl").is_file()
                || dir.join(".git").exists()
        })
        .map(Path::to_path_buf)
}

/// Whether a SQLite error is a single-writer lock conflict.
pub fn is_lock_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        }
        _ => false,
    }
}

/// Handle on an open, exclusively locked ticket store.
pub struct Store {
    path: PathBuf,
    conn: Connection,
}

impl Store {
    /// Open or create the store at `path`, taking the file's write lock.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String =
            conn.query_row("PRAGMA locking_mode = EXCLUSIVE", [], |row| row.get(0))?;
        // In exclusive mode the lock taken by the first write is kept until close
        conn.execute_batch("BEGIN EXCLUSIVE; COMMIT;")?;
        schema::init_schema(&conn)?;

        debug!(path = %path.display(), "opened ticket store");
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Ticket Operations ===

    /// Load a ticket with its ordered subtasks and validate it.
    pub fn get_ticket(&self, id: &str) -> Result<Ticket> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, tags, description, agent_summary, start_time, last_summary_time
                 FROM tickets WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, name, tags, description, agent_summary, start_time, last_summary_time)) =
            row
        else {
            return Err(ticket_not_found(id));
        };

        let mut ticket = Ticket {
            tags: decode_list(&id, "tags", &tags)?,
            subtasks: self.load_subtasks(&id)?,
            id,
            name,
            description,
            agent_summary,
            start_time,
            last_summary_time,
        };
        if ticket.name.is_empty() {
            ticket.name = ticket.id.clone();
        }

        validate_ticket(&ticket)?;
        Ok(ticket)
    }

    fn load_subtasks(&self, ticket_id: &str) -> Result<Vec<Subtask>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, tags, dependencies, description, test_conditions, test_command,
                    agent_notes, pass_timestamp, fail_timestamp, status
             FROM subtasks WHERE ticket_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map([ticket_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(
                    name,
                    tags,
                    dependencies,
                    description,
                    test_conditions,
                    test_command,
                    agent_notes,
                    pass_timestamp,
                    fail_timestamp,
                    status,
                )|
                 -> Result<Subtask> {
                    let context = format!("{}/{}", ticket_id, name);
                    Ok(Subtask {
                        tags: decode_list(&context, "tags", &tags)?,
                        dependencies: decode_list(&context, "dependencies", &dependencies)?,
                        test_conditions: decode_list(&context, "test_conditions", &test_conditions)?,
                        status: parse_status(ticket_id, &name, &status)?,
                        name,
                        description,
                        test_command,
                        agent_notes,
                        pass_timestamp,
                        fail_timestamp,
                    })
                },
            )
            .collect()
    }

    pub fn ticket_exists(&self, id: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM tickets WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Validate and persist a ticket, rewriting its subtask rows in order.
    pub fn save_ticket(&mut self, ticket: &Ticket) -> Result<()> {
        validate_ticket(ticket)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO tickets
            (id, name, tags, description, agent_summary, start_time, last_summary_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                tags = excluded.tags,
                description = excluded.description,
                agent_summary = excluded.agent_summary,
                start_time = excluded.start_time,
                last_summary_time = excluded.last_summary_time
            "#,
            params![
                ticket.id,
                ticket.name,
                serde_json::to_string(&ticket.tags)?,
                ticket.description,
                ticket.agent_summary,
                ticket.start_time,
                ticket.last_summary_time,
            ],
        )?;

        tx.execute("DELETE FROM subtasks WHERE ticket_id = ?1", [&ticket.id])?;
        {
            let mut insert = tx.prepare(
                r#"
                INSERT INTO subtasks
                (ticket_id, position, name, tags, dependencies, description, test_conditions,
                 test_command, agent_notes, pass_timestamp, fail_timestamp, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )?;
            for (position, st) in ticket.subtasks.iter().enumerate() {
                insert.execute(params![
                    ticket.id,
                    position as i64,
                    st.name,
                    serde_json::to_string(&st.tags)?,
                    serde_json::to_string(&st.dependencies)?,
                    st.description,
                    serde_json::to_string(&st.test_conditions)?,
                    st.test_command,
                    st.agent_notes,
                    st.pass_timestamp,
                    st.fail_timestamp,
                    st.status.as_str(),
                ])?;
            }
        }
        tx.commit()?;

        debug!(ticket = %ticket.id, subtasks = ticket.subtasks.len(), "saved ticket");
        Ok(())
    }

    /// All ticket ids, ascending.
    pub fn list_tickets(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM tickets ORDER BY id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Remove a ticket and everything recorded against it.
    ///
    /// Cleanup only; normal operation never deletes tickets.
    pub fn delete_ticket(&mut self, id: &str) -> Result<()> {
        if !self.ticket_exists(id)? {
            return Err(ticket_not_found(id));
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM subtasks WHERE ticket_id = ?1", [id])?;
        tx.execute("DELETE FROM ticket_summaries WHERE ticket_id = ?1", [id])?;
        tx.execute("DELETE FROM ticket_logs WHERE ticket_id = ?1", [id])?;
        tx.execute("DELETE FROM tickets WHERE id = ?1", [id])?;
        tx.execute(
            "DELETE FROM ticket_meta WHERE key = ?1 AND value = ?2",
            params![CURRENT_TICKET_KEY, id],
        )?;
        tx.commit()?;

        debug!(ticket = %id, "deleted ticket");
        Ok(())
    }

    // === Summary Operations ===

    pub fn append_summary(&mut self, entry: &SummaryEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ticket_summaries (ticket_id, subtask_name, timestamp, content)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.ticket_id, entry.subtask_name, entry.timestamp, entry.content],
        )?;
        Ok(())
    }

    /// Summaries for a ticket, oldest first.
    pub fn list_summaries(&self, ticket_id: &str) -> Result<Vec<SummaryEntry>> {
        self.query_summaries(
            "SELECT ticket_id, subtask_name, timestamp, content FROM ticket_summaries
             WHERE ticket_id = ?1 ORDER BY timestamp ASC, rowid ASC",
            &[&ticket_id],
        )
    }

    /// Most recent summary for a ticket.
    pub fn last_summary(&self, ticket_id: &str) -> Result<Option<SummaryEntry>> {
        Ok(self
            .query_summaries(
                "SELECT ticket_id, subtask_name, timestamp, content FROM ticket_summaries
                 WHERE ticket_id = ?1 ORDER BY timestamp DESC, rowid DESC LIMIT 1",
                &[&ticket_id],
            )?
            .into_iter()
            .next())
    }

    /// Most recent summary recorded against one subtask.
    pub fn last_summary_for_subtask(
        &self,
        ticket_id: &str,
        subtask: &str,
    ) -> Result<Option<SummaryEntry>> {
        Ok(self
            .query_summaries(
                "SELECT ticket_id, subtask_name, timestamp, content FROM ticket_summaries
                 WHERE ticket_id = ?1 AND subtask_name = ?2
                 ORDER BY timestamp DESC, rowid DESC LIMIT 1",
                &[&ticket_id, &subtask],
            )?
            .into_iter()
            .next())
    }

    /// Case-sensitive substring search over content and subtask name across
    /// all tickets, most recent first.
    pub fn search_summaries(&self, query: &str) -> Result<Vec<SummaryEntry>> {
        self.query_summaries(
            "SELECT ticket_id, subtask_name, timestamp, content FROM ticket_summaries
             WHERE instr(content, ?1) > 0 OR instr(COALESCE(subtask_name, ''), ?1) > 0
             ORDER BY timestamp DESC, rowid DESC",
            &[&query],
        )
    }

    fn query_summaries(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<SummaryEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map(args, |row| {
                Ok(SummaryEntry {
                    ticket_id: row.get(0)?,
                    subtask_name: row.get(1)?,
                    timestamp: row.get(2)?,
                    content: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // === Log Operations ===

    pub fn append_log(&mut self, entry: &LogEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ticket_logs (ticket_id, timestamp, entry_type, message, subtask)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.ticket_id,
                entry.timestamp,
                entry.entry_type,
                entry.message,
                entry.subtask
            ],
        )?;
        Ok(())
    }

    /// Activity entries for a ticket, oldest first.
    pub fn get_log_entries(&self, ticket_id: &str) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT ticket_id, timestamp, entry_type, message, subtask FROM ticket_logs
             WHERE ticket_id = ?1 ORDER BY timestamp ASC, rowid ASC",
        )?;
        let entries = stmt
            .query_map([ticket_id], |row| {
                Ok(LogEntry {
                    ticket_id: row.get(0)?,
                    timestamp: row.get(1)?,
                    entry_type: row.get(2)?,
                    message: row.get(3)?,
                    subtask: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // === Current Ticket ===

    pub fn set_current_ticket(&mut self, id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO ticket_meta (key, value) VALUES (?1, ?2)",
            params![CURRENT_TICKET_KEY, id],
        )?;
        Ok(())
    }

    /// The current ticket id, or [`Error::NoCurrentTicket`] when unset.
    pub fn get_current_ticket_id(&self) -> Result<String> {
        self.current_ticket_id()?.ok_or(Error::NoCurrentTicket)
    }

    pub fn current_ticket_id(&self) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM ticket_meta WHERE key = ?1",
                [CURRENT_TICKET_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    // === Vault Keys ===

    /// Insert or fully overwrite a key entry.
    pub fn save_key(&mut self, key: &KeyEntry) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO keys (name, encrypted_value, salt, nonce)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.name, key.encrypted_value, key.salt, key.nonce],
        )?;
        Ok(())
    }

    /// A key entry, or `None` when absent.
    pub fn get_key(&self, name: &str) -> Result<Option<KeyEntry>> {
        let key = self
            .conn
            .query_row(
                "SELECT name, encrypted_value, salt, nonce FROM keys WHERE name = ?1",
                [name],
                |row| {
                    Ok(KeyEntry {
                        name: row.get(0)?,
                        encrypted_value: row.get(1)?,
                        salt: row.get(2)?,
                        nonce: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(key)
    }

    /// Key names, ascending.
    pub fn list_key_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM keys ORDER BY name ASC")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Delete a key entry. Returns whether a row was removed.
    pub fn delete_key(&mut self, name: &str) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM keys WHERE name = ?1", [name])?;
        Ok(removed > 0)
    }
}

fn ticket_not_found(id: &str) -> Error {
    Error::NotFound(format!(
        "ticket not found: {}; run 'ticket list' to see known tickets or 'ticket add {}' to create it",
        id, id
    ))
}

fn decode_list<T: serde::de::DeserializeOwned + Default>(
    context: &str,
    column: &str,
    raw: &str,
) -> Result<T> {
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(raw).map_err(|e| {
        Error::Validation(format!("{}: column {} is not a JSON array: {}", context, column, e))
    })
}
