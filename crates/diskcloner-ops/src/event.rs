//! Events published by the operation controller.

use diskcloner_core::{LogEntry, OperationOutcome, Phase};

/// A notification delivered to subscribers, in the order the controller
/// applied the corresponding state changes.
#[derive(Debug, Clone)]
pub enum OperationEvent {
    /// The phase changed.
    PhaseChanged {
        operation_id: Option<u64>,
        phase: Phase,
    },
    /// The percentage of the current pass changed.
    Progress {
        operation_id: u64,
        /// `Running` for the copy pass, `Verifying` for the verify pass.
        stage: Phase,
        percent: u8,
        bytes_done: u64,
        total_bytes: u64,
    },
    /// A session log entry was appended.
    Log(LogEntry),
    /// The worker finished; the phase is now terminal.
    Finished {
        operation_id: u64,
        outcome: OperationOutcome,
    },
}

impl OperationEvent {
    /// The log entry carried by this event, if any.
    pub fn as_log(&self) -> Option<&LogEntry> {
        match self {
            Self::Log(entry) => Some(entry),
            _ => None,
        }
    }

    /// `(stage, percent)` for progress events.
    pub fn as_progress(&self) -> Option<(Phase, u8)> {
        match self {
            Self::Progress { stage, percent, .. } => Some((*stage, *percent)),
            _ => None,
        }
    }
}
