//! Attached block device records.

use serde::{Deserialize, Serialize};

/// One block device reported by disk enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Device path used as the transfer engine id (e.g. `/dev/sda`).
    pub id: String,
    /// Kernel name (e.g. `sda`).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Device type as reported by the system (`disk`, `loop`, ...).
    pub kind: String,
    /// Vendor model string, if known.
    pub model: Option<String>,
}

impl DiskInfo {
    /// Create a disk record for `/dev/<name>`.
    pub fn new(name: impl Into<String>, size: u64, kind: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: format!("/dev/{name}"),
            name,
            size,
            kind: kind.into(),
            model: None,
        }
    }

    /// Set the model string, ignoring blank values.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        self
    }

    /// Whether this is a whole disk (not a partition, loop or rom device).
    pub fn is_disk(&self) -> bool {
        self.kind == "disk"
    }

    /// Human-readable size.
    pub fn size_display(&self) -> String {
        humansize::format_size(self.size, humansize::BINARY)
    }
}

impl std::fmt::Display for DiskInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) - {}",
            self.id,
            self.size_display(),
            self.model.as_deref().unwrap_or("Unknown Model")
        )
    }
}
