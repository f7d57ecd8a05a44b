//! Operation phase and state snapshot types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::error::OperationError;
use crate::request::OperationRequest;

/// The controller's position in its operation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, Serialize, Deserialize)]
pub enum Phase {
    /// Ready to accept a request.
    #[default]
    Idle,
    /// Copying source to destination.
    Running,
    /// Re-reading and comparing after the copy.
    Verifying,
    /// Stop requested; waiting for the next chunk boundary.
    Cancelling,
    /// Finished successfully.
    Completed,
    /// Stopped by an unrecoverable error.
    Failed,
    /// Stopped at the caller's request.
    Cancelled,
}

impl Phase {
    /// Whether a worker owns the state in this phase.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Verifying | Self::Cancelling)
    }

    /// Whether the operation has finished and awaits acknowledgement.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// BLAKE3 digest of device content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Read-only snapshot of the controller's state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationState {
    /// Current phase.
    pub phase: Phase,
    /// Percentage of the current pass, 0 to 100.
    pub progress: u8,
    /// Whether the caller asked to stop.
    pub cancel_requested: bool,
    /// Id of the accepted operation, if any.
    pub operation_id: Option<u64>,
    /// The request being executed.
    pub request: Option<OperationRequest>,
    /// Bytes processed in the current pass.
    pub bytes_done: u64,
    /// Total bytes of the current pass.
    pub total_bytes: u64,
    /// Failure detail; always set when `phase` is `Failed`.
    pub error: Option<OperationError>,
}

impl OperationState {
    /// Fresh idle state.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Short human-readable status line.
    pub fn status_line(&self) -> String {
        match self.phase {
            Phase::Idle => "Ready".to_string(),
            Phase::Running => format!("Cloning in progress... {}%", self.progress),
            Phase::Verifying => format!("Verifying... {}%", self.progress),
            Phase::Cancelling => "Stopping...".to_string(),
            Phase::Completed => "Operation completed".to_string(),
            Phase::Failed => match &self.error {
                Some(err) => format!("operation failed: {}", err.detail()),
                None => "operation failed".to_string(),
            },
            Phase::Cancelled => "operation was cancelled".to_string(),
        }
    }
}

/// How an accepted operation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
    /// Every byte was copied (and verified, when requested).
    Completed {
        /// Bytes copied.
        bytes: u64,
        /// Digest of the verified content, when verification ran.
        digest: Option<ContentHash>,
    },
    /// Stopped at a chunk boundary; the destination is partially written.
    Cancelled {
        /// Phase whose pass was interrupted.
        during: Phase,
        /// Bytes processed in that pass.
        bytes_done: u64,
        /// Progress percentage frozen at cancellation.
        progress: u8,
    },
    /// Stopped by an unrecoverable error.
    Failed(OperationError),
}

impl OperationOutcome {
    /// The terminal phase matching this outcome.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Completed { .. } => Phase::Completed,
            Self::Cancelled { .. } => Phase::Cancelled,
            Self::Failed(_) => Phase::Failed,
        }
    }

    /// Check if the operation fully succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_phase_classification() {
        for phase in Phase::iter() {
            assert!(!(phase.is_active() && phase.is_terminal()));
        }
        assert!(!Phase::Idle.is_active());
        assert!(!Phase::Idle.is_terminal());
        assert!(Phase::Cancelling.is_active());
        assert!(Phase::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_line_distinguishes_failed_and_cancelled() {
        let mut state = OperationState::idle();
        state.phase = Phase::Cancelled;
        assert_eq!(state.status_line(), "operation was cancelled");

        state.phase = Phase::Failed;
        assert!(state.status_line().starts_with("operation failed"));
    }

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(hash.to_hex().len(), 64);
        assert!(hash.to_string().starts_with("abab"));
    }
}
