//! Transfer engine interface consumed by the operation controller.
//!
//! An engine opens a source/destination pair and hands back a
//! [`TransferSession`] that performs positional chunk I/O. The controller
//! treats every error from these calls as fatal for the current operation;
//! retry policy, if any, belongs inside the engine.

use diskcloner_core::DeviceError;

/// Which side of a transfer a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Source,
    Destination,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

/// Factory for transfer sessions.
pub trait TransferEngine: Send + Sync {
    /// Short name for logs (e.g. "file", "memory").
    fn name(&self) -> &'static str;

    /// Open a source/destination pair for one operation.
    fn open(&self, source_id: &str, dest_id: &str) -> Result<Box<dyn TransferSession>, DeviceError>;
}

/// An open source/destination pair.
///
/// Calls block until the I/O completes. A chunk either completes or fails as
/// a unit from the controller's point of view.
pub trait TransferSession: Send {
    /// Number of bytes to transfer.
    fn total_size(&self) -> u64;

    /// Read `len` bytes at `offset` from one endpoint.
    fn read_chunk(&mut self, endpoint: Endpoint, offset: u64, len: usize) -> Result<Vec<u8>, DeviceError>;

    /// Write `data` at `offset` on the destination.
    fn write_chunk(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    /// Flush buffered writes to stable storage.
    fn flush(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}
