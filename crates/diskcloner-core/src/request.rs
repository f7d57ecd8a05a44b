//! Clone request type.

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// One invocation of the clone operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Block device (or image) to read from.
    pub source_id: String,
    /// Block device (or image) to overwrite.
    pub dest_id: String,
    /// Re-read and compare the destination after copying.
    pub verify: bool,
    /// Skip confirmation. Only the caller looks at this.
    pub force: bool,
}

impl OperationRequest {
    /// Create a request with verification enabled and confirmation required.
    pub fn new(source_id: impl Into<String>, dest_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            dest_id: dest_id.into(),
            verify: true,
            force: false,
        }
    }

    /// Set whether to verify after copying.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set whether confirmation is skipped.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Check the request invariants.
    pub fn validate(&self) -> Result<(), ControllerError> {
        let source = self.source_id.trim();
        let dest = self.dest_id.trim();

        if source.is_empty() || dest.is_empty() {
            return Err(ControllerError::invalid(
                "Please select both source and destination disks",
            ));
        }

        if source == dest {
            return Err(ControllerError::invalid(
                "Source and destination cannot be the same",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for OperationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.source_id, self.dest_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        assert!(OperationRequest::new("disk-A", "disk-B").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_same_device() {
        let err = OperationRequest::new("/dev/sda", "/dev/sda")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ControllerError::InvalidRequest { .. }));
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(OperationRequest::new("", "/dev/sdb").validate().is_err());
        assert!(OperationRequest::new("/dev/sda", "   ").validate().is_err());
    }

    #[test]
    fn test_builder_flags() {
        let request = OperationRequest::new("a", "b").with_verify(false).with_force(true);
        assert!(!request.verify);
        assert!(request.force);
        assert_eq!(request.to_string(), "a -> b");
    }
}
