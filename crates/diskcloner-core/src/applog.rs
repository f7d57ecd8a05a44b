//! The application log kept across sessions.
//!
//! Every session log entry is also appended to a single file in the log
//! directory, one JSON object per line, so the complete history can be
//! exported later in any format.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::export::default_log_dir;
use crate::log::LogEntry;

/// File name of the application log inside the log directory.
pub const APPLICATION_LOG_FILE: &str = "diskcloner.jsonl";

/// Receives each log entry as it is produced.
pub trait LogSink: Send + Sync + std::fmt::Debug {
    fn record(&self, entry: &LogEntry) -> Result<(), ExportError>;
}

/// Append-only log file shared by every run of the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationLog {
    path: PathBuf,
}

impl ApplicationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The application log inside `dir`, or the default log directory.
    pub fn in_dir(dir: Option<&Path>) -> Result<Self, ExportError> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => default_log_dir().ok_or(ExportError::NoLogDir)?,
        };
        Ok(Self::new(dir.join(APPLICATION_LOG_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, creating the file and its directory on first use.
    pub fn append(&self, entry: &LogEntry) -> Result<(), ExportError> {
        let line = serde_json::to_string(entry).map_err(|e| ExportError::Serialize {
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        writeln!(file, "{line}").map_err(|source| self.io_error(source))
    }

    /// Every entry recorded so far, oldest first.
    ///
    /// A missing file is an empty log. Lines that do not parse are skipped.
    pub fn entries(&self) -> Result<Vec<LogEntry>, ExportError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        let mut entries = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), line = number + 1, error = %err, "skipping malformed log line");
                }
            }
        }
        Ok(entries)
    }

    fn io_error(&self, source: std::io::Error) -> ExportError {
        ExportError::Log {
            path: self.path.clone(),
            source,
        }
    }
}

impl LogSink for ApplicationLog {
    fn record(&self, entry: &LogEntry) -> Result<(), ExportError> {
        self.append(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let log = ApplicationLog::in_dir(Some(temp.path())).unwrap();
        assert!(log.entries().unwrap().is_empty());
        assert_eq!(log.path(), temp.path().join(APPLICATION_LOG_FILE));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let temp = TempDir::new().unwrap();
        let log = ApplicationLog::in_dir(Some(&temp.path().join("logs"))).unwrap();
        log.append(&LogEntry::info("first")).unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"not json\n\n")
            .unwrap();
        log.append(&LogEntry::error("second")).unwrap();

        let messages: Vec<String> = log.entries().unwrap().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_append_into_file_parent_fails() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let log = ApplicationLog::in_dir(Some(&blocker)).unwrap();
        let result = log.append(&LogEntry::info("lost"));
        assert!(matches!(result, Err(ExportError::Log { .. })));
    }
}
