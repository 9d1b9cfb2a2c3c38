use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Message severity. Lower level numbers are more severe, so a message
/// clears a threshold when `severity <= threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Severity {
    Critical = 0,
    Error = 1,
    Warning = 2,
    Message = 3,
    Notice = 4,
    Debug = 5,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Severity::Critical,
        Severity::Error,
        Severity::Warning,
        Severity::Message,
        Severity::Notice,
        Severity::Debug,
    ];

    /// Numeric level, 0 (Critical) through 5 (Debug).
    #[inline]
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        Self::ALL.get(usize::from(level)).copied()
    }

    /// True when this severity is at least as severe as `threshold`.
    #[inline]
    pub fn clears(self, threshold: Severity) -> bool {
        self <= threshold
    }

    pub fn name(self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Message => "Message",
            Severity::Notice => "Notice",
            Severity::Debug => "Debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity '{0}' (expected 0-5 or critical/error/warning/message/notice/debug)")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(level) = trimmed.parse::<u8>() {
            return Severity::from_level(level).ok_or_else(|| ParseSeverityError(s.to_string()));
        }
        Severity::ALL
            .into_iter()
            .find(|sev| sev.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseSeverityError(s.to_string()))
    }
}

/// A single notification recorded during a watch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub summary: String,
    pub detail: Option<String>,
}

impl Message {
    pub fn new(severity: Severity, summary: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            timestamp: Local::now(),
            severity,
            summary: summary.into(),
            detail,
        }
    }

    /// One-line rendering used for the log file and console echo.
    pub fn log_line(&self) -> String {
        format_line(&self.timestamp, self.severity, &self.summary)
    }
}

pub(crate) fn format_line(ts: &DateTime<Local>, severity: Severity, summary: &str) -> String {
    format!("[{}][{}] {}", ts.format("%Y-%m-%d %H:%M:%S"), severity, summary)
}
