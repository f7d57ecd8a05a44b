//! Disk enumeration through `lsblk`.

use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use diskcloner_core::{DiskInfo, EnumerationError};

use crate::enumerator::{BoxFuture, DiskEnumerator};

/// Default time allowed for `lsblk` to answer.
pub const DEFAULT_LSBLK_TIMEOUT: Duration = Duration::from_secs(10);

const LSBLK_ARGS: [&str; 5] = ["-J", "-b", "-d", "-o", "NAME,SIZE,TYPE,MODEL"];

/// Enumerates disks by running `lsblk` and parsing its JSON output.
#[derive(Debug, Clone)]
pub struct LsblkEnumerator {
    program: String,
    timeout: Duration,
}

impl Default for LsblkEnumerator {
    fn default() -> Self {
        Self {
            program: "lsblk".to_string(),
            timeout: DEFAULT_LSBLK_TIMEOUT,
        }
    }
}

impl LsblkEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable (e.g. an absolute path).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self) -> Result<Vec<DiskInfo>, EnumerationError> {
        let mut command = Command::new(&self.program);
        command
            .args(LSBLK_ARGS)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                tracing::warn!(program = %self.program, timeout = ?self.timeout, "lsblk timed out");
                return Err(EnumerationError::Timeout);
            }
            Ok(Err(e)) => {
                return Err(EnumerationError::ToolUnavailable {
                    message: format!("{}: {e}", self.program),
                });
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            };
            return Err(EnumerationError::CommandFailed { message });
        }

        let disks = parse_lsblk_json(&output.stdout)?;
        tracing::debug!(count = disks.len(), "enumerated disks");
        Ok(disks)
    }
}

impl DiskEnumerator for LsblkEnumerator {
    fn name(&self) -> &'static str {
        "lsblk"
    }

    fn enumerate(&self) -> BoxFuture<'_, Result<Vec<DiskInfo>, EnumerationError>> {
        Box::pin(self.run())
    }
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    size: Option<LsblkSize>,
    #[serde(rename = "type")]
    kind: Option<String>,
    model: Option<String>,
}

/// Older `lsblk` releases print numbers as strings even with `-J -b`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LsblkSize {
    Bytes(u64),
    Text(String),
}

impl LsblkSize {
    fn bytes(&self) -> Option<u64> {
        match self {
            Self::Bytes(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Parse `lsblk -J -b -d -o NAME,SIZE,TYPE,MODEL` output, keeping whole disks.
pub fn parse_lsblk_json(stdout: &[u8]) -> Result<Vec<DiskInfo>, EnumerationError> {
    let output: LsblkOutput = serde_json::from_slice(stdout).map_err(|e| EnumerationError::Malformed {
        message: e.to_string(),
    })?;

    let mut disks = Vec::new();
    for device in output.blockdevices {
        let kind = device.kind.unwrap_or_default();
        if kind != "disk" {
            continue;
        }
        let size = match device.size.as_ref().map(LsblkSize::bytes) {
            Some(Some(size)) => size,
            _ => {
                return Err(EnumerationError::Malformed {
                    message: format!("missing or invalid size for {}", device.name),
                });
            }
        };
        disks.push(DiskInfo::new(device.name, size, kind).with_model(device.model));
    }

    Ok(disks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_only_disks() {
        let json = br#"{
            "blockdevices": [
                {"name": "sda", "size": 500107862016, "type": "disk", "model": "Samsung SSD 860  "},
                {"name": "loop0", "size": 4096, "type": "loop", "model": null},
                {"name": "sr0", "size": 1073741312, "type": "rom", "model": "DVD-ROM"},
                {"name": "nvme0n1", "size": 1000204886016, "type": "disk", "model": null}
            ]
        }"#;

        let disks = parse_lsblk_json(json).unwrap();
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].id, "/dev/sda");
        assert_eq!(disks[0].size, 500_107_862_016);
        assert_eq!(disks[0].model.as_deref(), Some("Samsung SSD 860"));
        assert_eq!(disks[1].name, "nvme0n1");
        assert!(disks[1].model.is_none());
    }

    #[test]
    fn test_parse_string_sizes() {
        let json = br#"{"blockdevices": [{"name": "sdb", "size": "8004304896", "type": "disk", "model": "USB"}]}"#;
        let disks = parse_lsblk_json(json).unwrap();
        assert_eq!(disks[0].size, 8_004_304_896);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_lsblk_json(b"NAME SIZE TYPE MODEL").unwrap_err();
        assert!(matches!(err, EnumerationError::Malformed { .. }));

        let json = br#"{"blockdevices": [{"name": "sdc", "size": "huge", "type": "disk"}]}"#;
        let err = parse_lsblk_json(json).unwrap_err();
        assert!(err.to_string().contains("sdc"));
    }

    #[test]
    fn test_parse_empty_listing() {
        assert!(parse_lsblk_json(br#"{"blockdevices": []}"#).unwrap().is_empty());
        assert!(parse_lsblk_json(b"{}").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let enumerator = LsblkEnumerator::new().with_program("/nonexistent/lsblk-missing");
        let err = enumerator.enumerate().await.unwrap_err();
        assert!(matches!(err, EnumerationError::ToolUnavailable { .. }));
    }
}
