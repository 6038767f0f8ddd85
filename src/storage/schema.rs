//! SQLite schema and column migrations for the ticket store.

use crate::Result;
use rusqlite::Connection;

/// Create every table and index if missing, then run migrations.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            description TEXT NOT NULL DEFAULT '',
            agent_summary TEXT NOT NULL DEFAULT '',
            start_time TEXT NOT NULL DEFAULT '',
            last_summary_time TEXT NOT NULL DEFAULT ''
        );

        -- tags, dependencies, test_conditions are JSON arrays
        CREATE TABLE IF NOT EXISTS subtasks (
            ticket_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            dependencies TEXT NOT NULL DEFAULT '[]',
            description TEXT NOT NULL DEFAULT '',
            test_conditions TEXT NOT NULL DEFAULT '[]',
            test_command TEXT,
            agent_notes TEXT NOT NULL DEFAULT '',
            pass_timestamp TEXT NOT NULL DEFAULT '',
            fail_timestamp TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'todo',
            PRIMARY KEY (ticket_id, position)
        );

        CREATE INDEX IF NOT EXISTS idx_subtasks_ticket ON subtasks(ticket_id);

        -- Append-only
        CREATE TABLE IF NOT EXISTS ticket_summaries (
            ticket_id TEXT NOT NULL,
            subtask_name TEXT,
            timestamp TEXT NOT NULL,
            content TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_summaries_ticket ON ticket_summaries(ticket_id, timestamp);

        -- Append-only
        CREATE TABLE IF NOT EXISTS ticket_logs (
            ticket_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            entry_type TEXT NOT NULL,
            message TEXT NOT NULL,
            subtask TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_logs_ticket ON ticket_logs(ticket_id, timestamp);

        CREATE TABLE IF NOT EXISTS ticket_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS keys (
            name TEXT PRIMARY KEY,
            encrypted_value BLOB NOT NULL,
            salt BLOB NOT NULL,
            nonce BLOB NOT NULL
        );
        "#,
    )?;

    run_migrations(conn)?;

    Ok(())
}

/// Add columns introduced after a store file was first created.
fn run_migrations(conn: &Connection) -> Result<()> {
    // SQLite has no ADD COLUMN IF NOT EXISTS, so check the table first
    if !has_column(conn, "subtasks", "test_command")? {
        conn.execute("ALTER TABLE subtasks ADD COLUMN test_command TEXT", [])?;
    }
    if !has_column(conn, "ticket_logs", "subtask")? {
        conn.execute("ALTER TABLE ticket_logs ADD COLUMN subtask TEXT", [])?;
    }
    Ok(())
}

pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(found)
}
