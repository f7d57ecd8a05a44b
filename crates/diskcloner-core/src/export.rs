//! Durable export of the session log.
//!
//! Exporters turn the accumulated [`LogEntry`] sequence into a document on
//! disk. Failures are reported to the caller as [`ExportError`] and have no
//! effect on any running operation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::ExportError;
use crate::log::LogEntry;

/// Something that can persist a session log.
pub trait LogExporter {
    /// File extension of the produced document.
    fn extension(&self) -> &'static str;

    /// Render the entries into the document body.
    fn render(&self, entries: &[LogEntry]) -> Result<String, ExportError>;

    /// Write the entries to `path`, creating parent directories.
    fn export(&self, entries: &[LogEntry], path: &Path) -> Result<PathBuf, ExportError> {
        let body = self.render(entries)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ExportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, body).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(path.to_path_buf())
    }
}

/// Plain text, one `"<timestamp> - <LEVEL> - <message>"` line per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLogExporter;

impl LogExporter for TextLogExporter {
    fn extension(&self) -> &'static str {
        "log"
    }

    fn render(&self, entries: &[LogEntry]) -> Result<String, ExportError> {
        let mut out = String::new();
        for entry in entries {
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        Ok(out)
    }
}

/// Pretty-printed JSON array of entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLogExporter;

impl LogExporter for JsonLogExporter {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, entries: &[LogEntry]) -> Result<String, ExportError> {
        serde_json::to_string_pretty(entries).map_err(|e| ExportError::Serialize {
            message: e.to_string(),
        })
    }
}

/// Default directory for exported session logs.
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("diskcloner").join("logs"))
}

/// Timestamped export path inside `dir` (or the default log directory).
pub fn session_log_path(dir: Option<&Path>, exporter: &dyn LogExporter) -> Result<PathBuf, ExportError> {
    timestamped_path(dir, "session_log", exporter)
}

/// Timestamped path for an export of the whole application log.
pub fn full_log_path(dir: Option<&Path>, exporter: &dyn LogExporter) -> Result<PathBuf, ExportError> {
    timestamped_path(dir, "full_log", exporter)
}

fn timestamped_path(dir: Option<&Path>, stem: &str, exporter: &dyn LogExporter) -> Result<PathBuf, ExportError> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => default_log_dir().ok_or(ExportError::NoLogDir)?,
    };
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    Ok(dir.join(format!("{stem}_{stamp}.{}", exporter.extension())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries() -> Vec<LogEntry> {
        vec![
            LogEntry::info("Starting clone operation: a -> b"),
            LogEntry::warning("Stop requested by user"),
        ]
    }

    #[test]
    fn test_text_export_writes_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/session.log");

        let written = TextLogExporter.export(&entries(), &path).unwrap();
        let content = fs::read_to_string(written).unwrap();

        assert_eq!(content.lines().count(), 2);
        assert!(content.contains(" - WARNING - Stop requested by user"));
    }

    #[test]
    fn test_json_export_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("session.json");
        let original = entries();

        JsonLogExporter.export(&original, &path).unwrap();
        let parsed: Vec<LogEntry> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_session_log_path_uses_extension() {
        let temp = TempDir::new().unwrap();
        let path = session_log_path(Some(temp.path()), &JsonLogExporter).unwrap();
        assert_eq!(path.extension().unwrap(), "json");
        assert!(path.starts_with(temp.path()));

        let path = full_log_path(Some(temp.path()), &TextLogExporter).unwrap();
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("full_log_") && name.ends_with(".log"), "{name}");
    }

    #[test]
    fn test_export_into_file_parent_fails() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let result = TextLogExporter.export(&entries(), &blocker.join("session.log"));
        assert!(matches!(result, Err(ExportError::Io { .. })));
    }
}
