//! Core types and traits for diskcloner.
//!
//! This crate provides the data model shared by the controller, the transfer
//! engines and the command line front end: requests, phases and state
//! snapshots, the session and application logs, configuration and the error
//! taxonomy.

mod applog;
mod config;
mod device;
mod error;
mod export;
mod log;
mod request;
mod state;

pub use applog::{ApplicationLog, LogSink, APPLICATION_LOG_FILE};
pub use config::{
    default_config_path, CloneConfig, CloneConfigBuilder, DEFAULT_CHUNK_SIZE,
    DEFAULT_EVENT_CAPACITY,
};
pub use device::DiskInfo;
pub use error::{
    ConfigError, ControllerError, DeviceError, DeviceErrorKind, EnumerationError, ExportError,
    OperationError,
};
pub use export::{
    default_log_dir, full_log_path, session_log_path, JsonLogExporter, LogExporter,
    TextLogExporter,
};
pub use log::{LogEntry, LogLevel};
pub use request::OperationRequest;
pub use state::{ContentHash, OperationOutcome, OperationState, Phase};
