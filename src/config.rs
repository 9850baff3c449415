//! Pipeline configuration
//!
//! One explicit context object is handed to every run. It can be built in code,
//! loaded from a JSON file, and overridden field by field from the CLI.

use crate::error::EtlError;
use crate::sessionizer::DEFAULT_SESSION_GAP_MINUTES;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_session_gap_minutes() -> u32 {
    DEFAULT_SESSION_GAP_MINUTES
}

/// Settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// NDJSON input path (`-` for stdin)
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// Base directory of the curated datasets
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Inactivity gap that closes a session
    #[serde(default = "default_session_gap_minutes")]
    pub session_gap_minutes: u32,
    /// Worker threads for per-user and per-date stages
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// First date (inclusive) of events kept after cleaning
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Last date (inclusive) of events kept after cleaning
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            session_gap_minutes: default_session_gap_minutes(),
            workers: default_workers(),
            start_date: None,
            end_date: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file, filling unspecified fields with defaults
    pub fn from_json_file(path: &Path) -> Result<Self, EtlError> {
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_session_gap_minutes(mut self, minutes: u32) -> Self {
        self.session_gap_minutes = minutes;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Whether a date falls inside the configured range
    pub fn includes_date(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }

    pub fn validate(&self) -> Result<(), EtlError> {
        if self.session_gap_minutes == 0 {
            return Err(EtlError::InvalidConfig(
                "session_gap_minutes must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(EtlError::InvalidConfig(
                "workers must be greater than zero".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(EtlError::InvalidConfig(format!(
                    "start_date {start} is after end_date {end}"
                )));
            }
        }
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD` date argument
pub fn parse_date(value: &str) -> Result<NaiveDate, EtlError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| EtlError::DateParseError(format!("{value}: {e}")))
}
