//! CLI argument definitions for the ticket tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::SubtaskStatus;

/// ticket - track a unit of work as ordered, tested subtasks.
///
/// Start with `ticket add <id>`, describe it with `ticket upsert`, then let
/// `ticket next` pick, run and record ready subtasks.
#[derive(Parser, Debug)]
#[command(name = "ticket")]
#[command(
    author,
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("TICKETBOOK_GIT_COMMIT"),
        " ",
        env!("TICKETBOOK_BUILD_TIMESTAMP"),
        ")"
    ),
    about = "A local ticket/subtask workflow engine with an encrypted secrets vault",
    long_about = None
)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Run as if ticket was started in <path> instead of the current directory.
    /// Can also be set via TICKET_REPO environment variable.
    #[arg(short = 'C', long = "repo", global = true, env = "TICKET_REPO")]
    pub repo_path: Option<PathBuf>,

    /// Store file to use (overrides TICKET_DB_PATH and config files)
    #[arg(long = "db", global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Per-test timeout in seconds (overrides TICKET_TEST_TIMEOUT_SECS)
    #[arg(long = "timeout", global = true, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a ticket (with an `init` subtask) if absent and make it current
    Add {
        /// Ticket ID, typically a branch-style slug
        id: String,
    },

    /// Like `add`, also stamping the ticket's start time
    Start {
        /// Ticket ID
        id: String,
    },

    /// List ticket IDs (current ticket marked)
    List,

    /// Load a ticket and run every structural and temporal check
    Validate {
        /// Ticket ID
        id: String,
    },

    /// Create or update a ticket from JSON
    ///
    /// Status and timestamp fields are engine-owned and are rejected.
    Upsert {
        /// JSON file to read ("-" or omitted reads standard input)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Subtask commands
    Subtask {
        #[command(subcommand)]
        command: SubtaskCommands,
    },

    /// Run ready subtasks in order until none remain or one fails
    Next {
        /// Ticket ID (defaults to the current ticket)
        id: Option<String>,
    },

    /// Run every registered test for a ticket in one isolated process
    Test {
        /// Ticket ID
        id: String,
    },

    /// Finalize the current ticket and compose its agent summary
    Done {
        /// Final summary to append first
        summary: Option<String>,
    },

    /// Delete a ticket with its subtasks, summaries and logs
    Delete {
        /// Ticket ID
        id: String,
    },

    /// List the current ticket's summaries, or add one
    Summary {
        #[command(subcommand)]
        command: Option<SummaryCommands>,
    },

    /// Search summaries across all tickets (case-sensitive substring)
    Search {
        /// Text to look for
        query: String,
    },

    /// Append a message to the current ticket's activity log
    Log {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Record a question against the current ticket
    Ask {
        /// Subtask the question is about
        #[arg(long)]
        subtask: Option<String>,

        /// Question text
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Acknowledge messages on the current ticket
    Ack {
        /// Acknowledgement text (defaults to "Acknowledged messages")
        message: Vec<String>,
    },

    /// Show a ticket's activity log
    Logs {
        /// Ticket ID (defaults to the current ticket)
        id: Option<String>,
    },

    /// Encrypted secrets vault
    ///
    /// `ticket key <name> <password>` leases (decrypts) a stored secret.
    #[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
    Key {
        #[command(subcommand)]
        command: Option<KeyCommands>,

        /// Key name to lease
        name: Option<String>,

        /// Password the key was stored with
        password: Option<String>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run one registered test (or all of a ticket's) in this process
    #[command(name = "__harness", hide = true)]
    Harness {
        ticket_id: String,
        subtask: Option<String>,
    },
}

/// Subtask subcommands
#[derive(Subcommand, Debug)]
pub enum SubtaskCommands {
    /// Show the subtask table and the next subtask in full
    List {
        /// Ticket ID
        id: String,
    },

    /// Mark a subtask done and stamp its pass time
    Done {
        /// Ticket ID
        id: String,
        /// Subtask name
        subtask: String,
    },

    /// Mark a subtask failed and stamp its fail time
    Failed {
        /// Ticket ID
        id: String,
        /// Subtask name
        subtask: String,
        /// Failure reason stored as the subtask's notes
        #[arg(long)]
        note: Option<String>,
    },

    /// Replace a subtask's notes
    Note {
        /// Ticket ID
        id: String,
        /// Subtask name
        subtask: String,
        /// Note text
        #[arg(required = true, num_args = 1..)]
        note: Vec<String>,
    },

    /// Run one subtask's test in isolation and record the result
    Test {
        /// Ticket ID
        id: String,
        /// Subtask name
        subtask: String,
    },

    /// Set a subtask's status directly
    Status {
        /// Ticket ID
        id: String,
        /// Subtask name
        subtask: String,
        /// New status (todo, progress, done, failed, skipped)
        #[arg(value_parser = parse_status_arg)]
        status: SubtaskStatus,
        /// Reset both pass and fail timestamps
        #[arg(long)]
        clear_timestamps: bool,
    },
}

fn parse_status_arg(s: &str) -> Result<SubtaskStatus, String> {
    SubtaskStatus::parse(s)
        .ok_or_else(|| format!("invalid status '{}': use todo, progress, done, failed or skipped", s))
}

/// Summary subcommands
#[derive(Subcommand, Debug)]
pub enum SummaryCommands {
    /// Append a summary to the current ticket
    Add {
        /// Summary text
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
    },
}

/// Vault subcommands
#[derive(Subcommand, Debug)]
pub enum KeyCommands {
    /// Encrypt and store a secret under a password
    Add {
        /// Key name
        name: String,
        /// Secret value
        value: String,
        /// Password used to derive the encryption key
        password: String,
    },

    /// List stored key names
    List,

    /// Remove a stored key (no error if absent)
    Rm {
        /// Key name
        name: String,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show each resolved setting with its source
    Show,
}
