use diskcloner_core::{
    ApplicationLog, CloneConfig, ContentHash, ControllerError, DeviceError, DeviceErrorKind, DiskInfo,
    JsonLogExporter, LogEntry, LogExporter, LogLevel, OperationError, OperationOutcome,
    OperationRequest, OperationState, Phase, TextLogExporter, session_log_path,
};
use strum::IntoEnumIterator;
use tempfile::TempDir;

#[test]
fn test_request_validation_messages() {
    let err = OperationRequest::new("/dev/sda", "/dev/sda").validate().unwrap_err();
    assert_eq!(err.to_string(), "Invalid request: Source and destination cannot be the same");

    let err = OperationRequest::new("   ", "/dev/sdb").validate().unwrap_err();
    assert!(matches!(err, ControllerError::InvalidRequest { .. }));

    let request = OperationRequest::new("/dev/sda", "/dev/sdb");
    assert!(request.validate().is_ok());
    assert!(request.verify);
    assert!(!request.force);
}

#[test]
fn test_controller_error_messages_name_the_phase() {
    let err = ControllerError::AlreadyRunning {
        phase: Phase::Verifying,
    };
    assert!(err.to_string().contains("Verifying"));

    let err = ControllerError::StillRunning {
        phase: Phase::Cancelling,
    };
    assert!(err.to_string().contains("Cancelling"));
}

#[test]
fn test_every_phase_is_idle_active_or_terminal() {
    for phase in Phase::iter() {
        let classes = [phase == Phase::Idle, phase.is_active(), phase.is_terminal()];
        assert_eq!(classes.iter().filter(|c| **c).count(), 1, "{phase}");
    }
}

#[test]
fn test_failed_state_serializes_with_error() {
    let err = OperationError::from(
        DeviceError::new(DeviceErrorKind::Write, "/dev/sdb", "Input/output error").at(4 * 1024 * 1024),
    );
    let state = OperationState {
        phase: Phase::Failed,
        progress: 42,
        operation_id: Some(3),
        request: Some(OperationRequest::new("/dev/sda", "/dev/sdb")),
        error: Some(err.clone()),
        ..OperationState::idle()
    };

    let json = serde_json::to_string(&state).unwrap();
    let back: OperationState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, state);
    assert_eq!(
        state.status_line(),
        format!("operation failed: {}", err.detail())
    );
}

#[test]
fn test_outcome_phases() {
    let completed = OperationOutcome::Completed {
        bytes: 10,
        digest: Some(ContentHash::new([1; 32])),
    };
    let cancelled = OperationOutcome::Cancelled {
        during: Phase::Running,
        bytes_done: 3,
        progress: 30,
    };
    let failed = OperationOutcome::Failed(OperationError::VerificationFailed {
        offset: 0,
        length: 1,
        detail: "mismatch".into(),
    });

    assert_eq!(completed.phase(), Phase::Completed);
    assert_eq!(cancelled.phase(), Phase::Cancelled);
    assert_eq!(failed.phase(), Phase::Failed);
    assert!(completed.is_success());
    assert!(!cancelled.is_success());
}

#[test]
fn test_disk_display() {
    let disk = DiskInfo::new("sdb", 16 * 1024 * 1024 * 1024, "disk")
        .with_model(Some("Ultra USB 3.0".to_string()));
    assert_eq!(disk.to_string(), "/dev/sdb (16 GiB) - Ultra USB 3.0");

    let disk = DiskInfo::new("sdc", 1024, "disk").with_model(Some("  ".to_string()));
    assert!(disk.to_string().ends_with("Unknown Model"));
}

#[test]
fn test_exported_logs_in_both_formats() {
    let temp = TempDir::new().unwrap();
    let entries = vec![
        LogEntry::info("Starting clone operation: /dev/sda -> /dev/sdb"),
        LogEntry::warning("Stop requested by user"),
        LogEntry::error("Clone operation failed: write failed"),
    ];

    let text = TextLogExporter;
    let path = session_log_path(Some(temp.path()), &text).unwrap();
    let written = text.export(&entries, &path).unwrap();
    let body = std::fs::read_to_string(written).unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with(" - WARNING - Stop requested by user"));

    let json = JsonLogExporter;
    let path = session_log_path(Some(&temp.path().join("nested")), &json).unwrap();
    let written = json.export(&entries, &path).unwrap();
    let parsed: Vec<LogEntry> = serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
    assert_eq!(parsed, entries);
    assert_eq!(parsed[2].level, LogLevel::Error);
}

#[test]
fn test_config_file_overrides_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "chunk_size = 1048576\nchunk_delay_ms = 10\nlog_dir = {:?}\n",
            temp.path().join("logs").display().to_string()
        ),
    )
    .unwrap();

    let config = CloneConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(config.chunk_size, 1024 * 1024);
    assert_eq!(config.chunk_delay_ms, 10);
    assert_eq!(config.log_dir, Some(temp.path().join("logs")));
    assert_eq!(config.event_capacity, CloneConfig::default().event_capacity);
}

#[test]
fn test_application_log_appends_across_runs() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("logs");

    let run = ApplicationLog::in_dir(Some(&dir)).unwrap();
    run.append(&LogEntry::info("diskcloner started")).unwrap();
    run.append(&LogEntry::success("Clone operation completed successfully")).unwrap();

    let next_run = ApplicationLog::in_dir(Some(&dir)).unwrap();
    next_run.append(&LogEntry::info("diskcloner started")).unwrap();
    next_run.append(&LogEntry::warning("Stop requested by user")).unwrap();

    let entries = ApplicationLog::in_dir(Some(&dir)).unwrap().entries().unwrap();
    let levels: Vec<LogLevel> = entries.iter().map(|e| e.level).collect();
    assert_eq!(
        levels,
        vec![LogLevel::Info, LogLevel::Success, LogLevel::Info, LogLevel::Warning]
    );

    let body = TextLogExporter.render(&entries).unwrap();
    assert_eq!(body.lines().count(), 4);
    assert!(body.lines().last().unwrap().ends_with(" - WARNING - Stop requested by user"));
}
