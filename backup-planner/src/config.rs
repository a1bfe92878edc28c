//! Configuration management for the backup planner.
//!
//! Loads a backup definition from a TOML file and validates it once, up front,
//! so that nothing later in the run has to re-check mandatory keys.

use crate::utils::errors::{BackupError, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory being backed up
    pub source_dir: PathBuf,

    /// Backup root; snapshots are created below it when versioned
    pub target_dir: PathBuf,

    /// Backup policy
    #[serde(default)]
    pub mode: BackupMode,

    /// Write every run into its own timestamped snapshot directory
    #[serde(default = "default_true")]
    pub versioned: bool,

    /// strftime pattern for snapshot directory names
    #[serde(default = "default_version_name")]
    pub version_name: String,

    /// Compare against the last successful snapshot instead of the directory being written
    #[serde(default = "default_true")]
    pub compare_with_last_backup: bool,

    /// Glob patterns matched against relative paths; first match excludes
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Ordered equality criteria
    #[serde(default = "default_compare_method")]
    pub compare_method: Vec<CompareMethod>,

    /// Persist the planned actions as `actions.json`
    #[serde(default = "default_true")]
    pub save_action_file: bool,

    /// Execute the plan after writing it (false = dry run)
    #[serde(default = "default_true")]
    pub apply_actions: bool,

    /// What it takes for a run to be recorded as successful
    #[serde(default)]
    pub success_policy: SuccessPolicy,

    #[serde(default)]
    pub log: LogConfig,
}

/// Backup policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    /// Add-only: new and changed files are written, nothing is removed
    #[default]
    Save,
    /// Exact replica: additions, changes and deletions
    Mirror,
    /// Versioned snapshots where unchanged files are hardlinked to the previous one
    Hardlink,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupMode::Save => "save",
            BackupMode::Mirror => "mirror",
            BackupMode::Hardlink => "hardlink",
        };
        f.write_str(name)
    }
}

impl FromStr for BackupMode {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "save" => Ok(BackupMode::Save),
            "mirror" => Ok(BackupMode::Mirror),
            "hardlink" => Ok(BackupMode::Hardlink),
            other => Err(BackupError::Config(format!("Backup mode '{}' does not exist", other))),
        }
    }
}

/// One equality criterion used by the comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMethod {
    /// Modification time, exact match at native resolution
    Moddate,
    /// Length in bytes
    Size,
    /// Full content, compared chunk by chunk
    Bytes,
}

impl fmt::Display for CompareMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompareMethod::Moddate => "moddate",
            CompareMethod::Size => "size",
            CompareMethod::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

impl FromStr for CompareMethod {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "moddate" => Ok(CompareMethod::Moddate),
            "size" => Ok(CompareMethod::Size),
            "bytes" => Ok(CompareMethod::Bytes),
            other => Err(BackupError::Config(format!(
                "Compare method '{}' does not exist",
                other
            ))),
        }
    }
}

/// Decides whether a finished run is recorded as successful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessPolicy {
    /// Every action was attempted, failures or not
    #[default]
    Completed,
    /// Every action was attempted and none of them failed
    NoFailures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_true() -> bool {
    true
}

fn default_version_name() -> String {
    "%d.%m.%y".to_string()
}

fn default_compare_method() -> Vec<CompareMethod> {
    vec![CompareMethod::Moddate, CompareMethod::Size, CompareMethod::Bytes]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BackupConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: BackupConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for everything but the two directories
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            mode: BackupMode::default(),
            versioned: true,
            version_name: default_version_name(),
            compare_with_last_backup: true,
            exclude_paths: Vec::new(),
            compare_method: default_compare_method(),
            save_action_file: true,
            apply_actions: true,
            success_policy: SuccessPolicy::default(),
            log: LogConfig::default(),
        }
    }

    /// Check mandatory values and normalize the hardlink invariants.
    pub fn validate(&mut self) -> Result<()> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(BackupError::Config("source_dir must not be empty".into()));
        }
        if !self.source_dir.is_dir() {
            return Err(BackupError::NotADirectory(self.source_dir.clone()));
        }
        if self.target_dir.as_os_str().is_empty() {
            return Err(BackupError::Config("target_dir must not be empty".into()));
        }
        if self.compare_method.is_empty() {
            return Err(BackupError::Config(
                "compare_method needs at least one entry".into(),
            ));
        }
        if self.version_name.trim().is_empty()
            || StrftimeItems::new(&self.version_name).any(|item| matches!(item, Item::Error))
        {
            return Err(BackupError::Config(format!(
                "version_name '{}' is not a valid strftime pattern",
                self.version_name
            )));
        }
        crate::fs::walker::ExcludeFilter::new(&self.exclude_paths)?;

        if self.mode == BackupMode::Hardlink && !(self.versioned && self.compare_with_last_backup) {
            tracing::warn!(
                "Hardlink mode requires versioned snapshots compared with the last backup; enabling both"
            );
            self.versioned = true;
            self.compare_with_last_backup = true;
        }

        Ok(())
    }

    /// Whether runs go into their own snapshot directories (always true in hardlink mode)
    pub fn is_versioned(&self) -> bool {
        self.versioned || self.mode == BackupMode::Hardlink
    }

    /// Whether the previous successful snapshot is the comparison base (always true in hardlink mode)
    pub fn compares_with_last_backup(&self) -> bool {
        self.is_versioned()
            && (self.compare_with_last_backup || self.mode == BackupMode::Hardlink)
    }
}
