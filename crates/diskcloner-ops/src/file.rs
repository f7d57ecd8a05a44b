//! Transfer engine backed by block devices or image files.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};

use diskcloner_core::{DeviceError, DeviceErrorKind};

use crate::engine::{Endpoint, TransferEngine, TransferSession};

/// Engine that copies between paths such as `/dev/sda` or `disk.img`.
#[derive(Debug, Clone, Default)]
pub struct FileEngine {
    /// Create the destination if it does not exist (image files only).
    pub create_destination: bool,
}

impl FileEngine {
    /// Create an engine that requires the destination to exist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine that creates missing destination image files.
    pub fn with_create_destination() -> Self {
        Self {
            create_destination: true,
        }
    }
}

impl TransferEngine for FileEngine {
    fn name(&self) -> &'static str {
        "file"
    }

    fn open(&self, source_id: &str, dest_id: &str) -> Result<Box<dyn TransferSession>, DeviceError> {
        let mut source = File::open(source_id)
            .map_err(|e| DeviceError::io(DeviceErrorKind::Open, source_id, &e))?;

        let mut dest = OpenOptions::new()
            .read(true)
            .write(true)
            .create(self.create_destination)
            .open(dest_id)
            .map_err(|e| DeviceError::io(DeviceErrorKind::Open, dest_id, &e))?;

        if let (Ok(a), Ok(b)) = (fs::canonicalize(source_id), fs::canonicalize(dest_id)) {
            if a == b {
                return Err(DeviceError::new(
                    DeviceErrorKind::Open,
                    dest_id,
                    "source and destination resolve to the same device",
                ));
            }
        }

        let total_size = device_size(&mut source, source_id)?;

        // Regular files grow on write; block devices have a fixed capacity.
        let dest_is_file = dest
            .metadata()
            .map(|m| m.is_file())
            .map_err(|e| DeviceError::io(DeviceErrorKind::Open, dest_id, &e))?;
        if !dest_is_file {
            let capacity = device_size(&mut dest, dest_id)?;
            if capacity < total_size {
                return Err(DeviceError::new(
                    DeviceErrorKind::TooSmall,
                    dest_id,
                    format!("{capacity} bytes available, {total_size} bytes needed"),
                ));
            }
        }

        tracing::debug!(source = source_id, dest = dest_id, total_size, "opened file session");

        Ok(Box::new(FileSession {
            source,
            dest,
            source_id: source_id.to_string(),
            dest_id: dest_id.to_string(),
            total_size,
        }))
    }
}

/// Size of a file or block device, found by seeking to its end.
fn device_size(file: &mut File, id: &str) -> Result<u64, DeviceError> {
    let size = file
        .seek(SeekFrom::End(0))
        .map_err(|e| DeviceError::io(DeviceErrorKind::Open, id, &e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| DeviceError::io(DeviceErrorKind::Open, id, &e))?;
    Ok(size)
}

struct FileSession {
    source: File,
    dest: File,
    source_id: String,
    dest_id: String,
    total_size: u64,
}

impl TransferSession for FileSession {
    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn read_chunk(&mut self, endpoint: Endpoint, offset: u64, len: usize) -> Result<Vec<u8>, DeviceError> {
        let (file, id) = match endpoint {
            Endpoint::Source => (&self.source, &self.source_id),
            Endpoint::Destination => (&self.dest, &self.dest_id),
        };

        let mut buf = vec![0u8; len];
        read_exact_at(file, &mut buf, offset).map_err(|e| {
            let kind = if e.kind() == std::io::ErrorKind::UnexpectedEof {
                DeviceErrorKind::ShortRead
            } else {
                DeviceErrorKind::Read
            };
            DeviceError::io(kind, id.as_str(), &e).at(offset)
        })?;

        Ok(buf)
    }

    fn write_chunk(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        write_all_at(&self.dest, data, offset)
            .map_err(|e| DeviceError::io(DeviceErrorKind::Write, self.dest_id.as_str(), &e).at(offset))
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.dest
            .sync_data()
            .map_err(|e| DeviceError::io(DeviceErrorKind::Write, self.dest_id.as_str(), &e))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(not(unix))]
fn read_exact_at(mut file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::io::Read;
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

#[cfg(not(unix))]
fn write_all_at(mut file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::io::Write;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_reports_source_size() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.img");
        let dst = temp.path().join("dst.img");
        fs::write(&src, vec![7u8; 1500]).unwrap();
        fs::write(&dst, b"").unwrap();

        let engine = FileEngine::new();
        let session = engine
            .open(src.to_str().unwrap(), dst.to_str().unwrap())
            .unwrap();
        assert_eq!(session.total_size(), 1500);
    }

    #[test]
    fn test_missing_destination_without_create() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.img");
        fs::write(&src, b"data").unwrap();

        let err = FileEngine::new()
            .open(src.to_str().unwrap(), temp.path().join("nope.img").to_str().unwrap())
            .err()
            .unwrap();
        assert_eq!(err.kind, DeviceErrorKind::Vanished);
    }

    #[test]
    fn test_write_then_read_back() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.img");
        let dst = temp.path().join("dst.img");
        fs::write(&src, b"hello world").unwrap();

        let mut session = FileEngine::with_create_destination()
            .open(src.to_str().unwrap(), dst.to_str().unwrap())
            .unwrap();

        let chunk = session.read_chunk(Endpoint::Source, 6, 5).unwrap();
        assert_eq!(chunk, b"world");
        session.write_chunk(6, &chunk).unwrap();
        session.flush().unwrap();

        let back = session.read_chunk(Endpoint::Destination, 6, 5).unwrap();
        assert_eq!(back, b"world");
    }

    #[test]
    fn test_short_read_past_end() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.img");
        let dst = temp.path().join("dst.img");
        fs::write(&src, b"abc").unwrap();

        let mut session = FileEngine::with_create_destination()
            .open(src.to_str().unwrap(), dst.to_str().unwrap())
            .unwrap();

        let err = session.read_chunk(Endpoint::Source, 0, 10).unwrap_err();
        assert_eq!(err.kind, DeviceErrorKind::ShortRead);
        assert_eq!(err.offset, Some(0));
    }

    #[test]
    fn test_same_file_rejected() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.img");
        fs::write(&src, b"abc").unwrap();
        let alias = temp.path().join(".").join("src.img");

        let err = FileEngine::new()
            .open(src.to_str().unwrap(), alias.to_str().unwrap())
            .err()
            .unwrap();
        assert_eq!(err.kind, DeviceErrorKind::Open);
    }
}
