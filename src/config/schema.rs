//! KDL schema for config.kdl.
//!
//! ```kdl
//! // Ticketbook preferences
//! store-path "tickets/tickets.db"
//! test-timeout-secs 600
//! output-format "human"  // or "json"
//! ```

use kdl::KdlDocument;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Preferences from one config.kdl file. Unset values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketbookConfig {
    /// Store file; relative paths resolve against the project root
    pub store_path: Option<String>,

    /// Per-test timeout for the execution protocol
    pub test_timeout_secs: Option<u64>,

    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,
}

impl TicketbookConfig {
    /// Load a config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let doc: KdlDocument = raw
            .parse()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|msg| Error::Config(format!("{}: {}", path.display(), msg)))?;
        Ok(config)
    }

    /// Parse config from a KDL document. Unknown nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::default();

        if let Some(s) = first_value(doc, "store-path").and_then(|v| v.as_string()) {
            config.store_path = Some(s.to_string());
        }

        if let Some(i) = first_value(doc, "test-timeout-secs").and_then(|v| v.as_integer()) {
            config.test_timeout_secs = u64::try_from(i).ok();
        }

        if let Some(s) = first_value(doc, "output-format").and_then(|v| v.as_string()) {
            config.output_format = OutputFormat::parse(s);
        }

        config
    }

    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.test_timeout_secs == Some(0) {
            return Err("test-timeout-secs must be greater than 0".to_string());
        }
        if self.store_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err("store-path must not be empty".to_string());
        }
        Ok(())
    }
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a kdl::KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}
