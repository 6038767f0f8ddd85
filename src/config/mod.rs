//! Configuration for ticketbook.
//!
//! Preferences live in KDL files:
//! - Project: `<repo>/tickets/config.kdl`
//! - System: `~/.config/ticketbook/config.kdl` (or `$TICKET_CONFIG_DIR/config.kdl`)
//!
//! Recognised nodes:
//! - `store-path` - Store file, relative to the project root
//! - `test-timeout-secs` - Per-test timeout for the execution protocol
//! - `output-format` - "json" or "human"
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_DIR_ENV, ConfigOverrides, DEFAULT_TIMEOUT_SECS, Resolved, ResolvedConfig,
    TIMEOUT_ENV, ValueSource, project_config_path, resolve_config, system_config_path,
};
pub use schema::{OutputFormat, TicketbookConfig};
