//! Session log entries.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

/// One append-only entry in the session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was produced.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    /// Format as `"<timestamp> - <LEVEL> - <message>"` in local time.
    pub fn to_line(&self) -> String {
        let local: DateTime<Local> = self.timestamp.into();
        format!(
            "{} - {} - {}",
            local.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }

    /// Mirror this entry to `tracing`.
    pub fn trace(&self) {
        match self.level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(target: "diskcloner", kind = %self.level, "{}", self.message)
            }
            LogLevel::Warning => tracing::warn!(target: "diskcloner", "{}", self.message),
            LogLevel::Error => tracing::error!(target: "diskcloner", "{}", self.message),
        }
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_display_uppercase() {
        assert_eq!(LogLevel::Info.to_string(), "INFO");
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
        assert_eq!(LogLevel::Success.to_string(), "SUCCESS");
    }

    #[test]
    fn test_entry_line_format() {
        let entry = LogEntry::success("Found 2 disk(s)");
        let line = entry.to_line();
        assert!(line.ends_with(" - SUCCESS - Found 2 disk(s)"));
        assert_eq!(entry.to_string(), "[SUCCESS] Found 2 disk(s)");
    }

    #[test]
    fn test_level_serde_uppercase() {
        let json = serde_json::to_string(&LogLevel::Error).unwrap();
        assert_eq!(json, "\"ERROR\"");
    }
}
