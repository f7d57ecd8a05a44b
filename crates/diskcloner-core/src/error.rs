//! Error types for clone operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::Phase;

/// Errors returned synchronously by the operation controller.
///
/// None of these start a worker or change the controller's state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControllerError {
    /// The request itself is malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// An operation is active, or a finished one has not been acknowledged.
    #[error("An operation is already in progress (phase: {phase})")]
    AlreadyRunning { phase: Phase },

    /// `reset` was called while the worker is still active.
    #[error("Cannot reset while the operation is still running (phase: {phase})")]
    StillRunning { phase: Phase },

    /// `submit` was called outside of a Tokio runtime.
    #[error("No async runtime available to run the operation")]
    NoRuntime,
}

impl ControllerError {
    /// Create an invalid request error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// Classification of a transfer engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceErrorKind {
    /// The device could not be opened.
    Open,
    /// Reading from a device failed.
    Read,
    /// Writing to the destination failed.
    Write,
    /// The device disappeared mid-operation.
    Vanished,
    /// The destination cannot hold the source.
    TooSmall,
    /// The device returned fewer bytes than requested.
    ShortRead,
    /// The engine itself misbehaved (e.g. panicked).
    Internal,
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open failed"),
            Self::Read => write!(f, "read failed"),
            Self::Write => write!(f, "write failed"),
            Self::Vanished => write!(f, "device vanished"),
            Self::TooSmall => write!(f, "destination too small"),
            Self::ShortRead => write!(f, "short read"),
            Self::Internal => write!(f, "engine fault"),
        }
    }
}

/// An unrecoverable error reported by a transfer engine.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{device}: {kind}{}: {message}", offset_suffix(.offset))]
pub struct DeviceError {
    /// What went wrong.
    pub kind: DeviceErrorKind,
    /// The device identifier involved.
    pub device: String,
    /// Byte offset of the failing chunk, if any.
    pub offset: Option<u64>,
    /// Human-readable detail.
    pub message: String,
}

impl DeviceError {
    /// Create a new device error.
    pub fn new(kind: DeviceErrorKind, device: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            device: device.into(),
            offset: None,
            message: message.into(),
        }
    }

    /// Attach the offset of the failing chunk.
    pub fn at(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Build a device error from an I/O error.
    pub fn io(kind: DeviceErrorKind, device: impl Into<String>, source: &std::io::Error) -> Self {
        let kind = match source.kind() {
            std::io::ErrorKind::NotFound => DeviceErrorKind::Vanished,
            _ => kind,
        };
        Self::new(kind, device, source.to_string())
    }
}

fn offset_suffix(offset: &Option<u64>) -> String {
    offset.map(|o| format!(" at offset {o}")).unwrap_or_default()
}

/// A terminal failure of a running operation.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationError {
    /// The transfer engine reported an error.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Destination content differs from the source after copying.
    #[error("Verification failed at offset {offset} ({length} bytes): {detail}")]
    VerificationFailed {
        offset: u64,
        length: u64,
        detail: String,
    },
}

impl OperationError {
    /// The human-readable detail, never empty.
    pub fn detail(&self) -> String {
        let detail = self.to_string();
        if detail.trim().is_empty() {
            "unknown error".to_string()
        } else {
            detail
        }
    }
}

/// Disk enumeration failures. These never touch controller state.
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// The listing tool did not answer in time.
    #[error("Timeout while refreshing disks")]
    Timeout,

    /// The listing tool is not installed or could not be spawned.
    #[error("Disk listing tool unavailable: {message}")]
    ToolUnavailable { message: String },

    /// The listing tool exited with an error.
    #[error("Disk listing command failed: {message}")]
    CommandFailed { message: String },

    /// The listing output could not be understood.
    #[error("Malformed disk listing: {message}")]
    Malformed { message: String },
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for a config.
    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Log export failures. These are local to the caller.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Writing the document failed.
    #[error("Failed to write log export {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or appending the application log failed.
    #[error("Failed to access application log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serializing the log failed.
    #[error("Failed to serialize log: {message}")]
    Serialize { message: String },

    /// No writable location is known for the export.
    #[error("No log directory available")]
    NoLogDir,
}
