//! Ticketbook - a local ticket/subtask workflow engine.
//!
//! This library provides the core functionality for the `ticket` CLI tool:
//! persisted tickets made of ordered, dependency-aware subtasks, a
//! "what's next" driver that runs each subtask's test in an isolated
//! process, and an encrypted secrets vault sharing the same store file.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod models;
pub mod registry;
pub mod report;
pub mod runner;
pub mod selector;
pub mod storage;
pub mod suites;
pub mod validation;
pub mod vault;

/// Environment variable that points the engine at an alternate store file.
pub const DB_PATH_ENV: &str = "TICKET_DB_PATH";

/// Library-level error type for ticketbook operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// The store file is held by another process.
    #[error(
        "the ticket store is busy: another command holds the store file. \
         Avoid running commands concurrently against the same store; wait and retry, \
         or point TICKET_DB_PATH at an isolated store"
    )]
    StoreBusy,

    #[error("{0}")]
    NotFound(String),

    #[error("no current ticket set; run 'ticket start <ticket-id>' or 'ticket add <ticket-id>'")]
    NoCurrentTicket,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(
        "[REGRESSION] ticket {ticket_id}: subtask {subtask} failed at {failed_at}, which is after it passed at {passed_at}"
    )]
    Regression {
        ticket_id: String,
        subtask: String,
        failed_at: String,
        passed_at: String,
    },

    #[error("dependency cycle in ticket {ticket_id}: {}", .cycle.join(" -> "))]
    DependencyCycle {
        ticket_id: String,
        cycle: Vec<String>,
    },

    /// Vault decryption failed. Deliberately says nothing about why.
    #[error("invalid password or corrupted key data")]
    InvalidPassword,

    #[error("test not registered: {ticket_id}/{subtask}")]
    TestNotRegistered { ticket_id: String, subtask: String },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        if storage::is_lock_conflict(&err) {
            Error::StoreBusy
        } else {
            Error::Database(err)
        }
    }
}

/// Result type alias for ticketbook operations.
pub type Result<T> = std::result::Result<T, Error>;
