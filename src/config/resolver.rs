//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`TICKET_DB_PATH`, `TICKET_TEST_TIMEOUT_SECS`)
//! 3. Project config.kdl (`<repo>/tickets/config.kdl`)
//! 4. System config.kdl (`<config_dir>/ticketbook/config.kdl`)
//! 5. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{OutputFormat, TicketbookConfig};
use crate::storage::default_store_path;
use crate::{DB_PATH_ENV, Error, Result};

/// Environment variable overriding the per-test timeout.
pub const TIMEOUT_ENV: &str = "TICKET_TEST_TIMEOUT_SECS";

/// Environment variable overriding the system config directory.
pub const CONFIG_DIR_ENV: &str = "TICKET_CONFIG_DIR";

/// Default per-test timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from environment variable
    EnvVar(String),
    /// Value from the project's config.kdl
    Project,
    /// Value from the system config.kdl
    System,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Project => write!(f, "project"),
            ValueSource::System => write!(f, "system"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Project root the store and relative paths hang off
    pub repo: PathBuf,
    pub store_path: Resolved<PathBuf>,
    pub test_timeout_secs: Resolved<u64>,
    pub output_format: Resolved<OutputFormat>,
}

impl ResolvedConfig {
    pub fn store_path(&self) -> &Path {
        &self.store_path.value
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs.value)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub store_path: Option<PathBuf>,
    pub test_timeout_secs: Option<u64>,
    pub output_format: Option<OutputFormat>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn with_test_timeout_secs(mut self, secs: u64) -> Self {
        self.test_timeout_secs = Some(secs);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }
}

/// Project config file location.
pub fn project_config_path(repo: &Path) -> PathBuf {
    repo.join("tickets").join("config.kdl")
}

/// System config file location, honouring `TICKET_CONFIG_DIR`.
pub fn system_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir).join("config.kdl"));
    }
    dirs::config_dir().map(|d| d.join("ticketbook").join("config.kdl"))
}

/// Resolve configuration for a project root with full precedence chain.
pub fn resolve_config(repo: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let system = match system_config_path() {
        Some(path) => TicketbookConfig::load(&path)?,
        None => TicketbookConfig::default(),
    };
    let project = TicketbookConfig::load(&project_config_path(repo))?;

    // Resolve store path
    let store_path = if let Some(path) = &overrides.store_path {
        Resolved::new(path.clone(), ValueSource::CliFlag)
    } else if let Some(path) = env_nonempty(DB_PATH_ENV) {
        Resolved::new(PathBuf::from(path), ValueSource::EnvVar(DB_PATH_ENV.to_string()))
    } else if let Some(path) = &project.store_path {
        Resolved::new(repo.join(path), ValueSource::Project)
    } else if let Some(path) = &system.store_path {
        Resolved::new(repo.join(path), ValueSource::System)
    } else {
        Resolved::new(default_store_path(repo), ValueSource::Default)
    };

    // Resolve test timeout
    let test_timeout_secs = if let Some(secs) = overrides.test_timeout_secs {
        Resolved::new(secs, ValueSource::CliFlag)
    } else if let Some(raw) = env_nonempty(TIMEOUT_ENV) {
        let secs = raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                Error::Config(format!("{} must be a positive integer, got {:?}", TIMEOUT_ENV, raw))
            })?;
        Resolved::new(secs, ValueSource::EnvVar(TIMEOUT_ENV.to_string()))
    } else if let Some(secs) = project.test_timeout_secs {
        Resolved::new(secs, ValueSource::Project)
    } else if let Some(secs) = system.test_timeout_secs {
        Resolved::new(secs, ValueSource::System)
    } else {
        Resolved::new(DEFAULT_TIMEOUT_SECS, ValueSource::Default)
    };
    if test_timeout_secs.value == 0 {
        return Err(Error::Config("test timeout must be greater than 0".to_string()));
    }

    // Resolve output format
    let output_format = if let Some(format) = overrides.output_format {
        Resolved::new(format, ValueSource::CliFlag)
    } else if let Some(format) = project.output_format {
        Resolved::new(format, ValueSource::Project)
    } else if let Some(format) = system.output_format {
        Resolved::new(format, ValueSource::System)
    } else {
        Resolved::new(OutputFormat::Json, ValueSource::Default)
    };

    Ok(ResolvedConfig {
        repo: repo.to_path_buf(),
        store_path,
        test_timeout_secs,
        output_format,
    })
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
