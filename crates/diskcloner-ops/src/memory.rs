//! In-memory transfer engine for simulation and tests.
//!
//! Devices are plain byte buffers registered by id. The engine can add a
//! fixed latency to every chunk call (the simulated wait of a dry run) and
//! inject faults on a given call number to exercise failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use diskcloner_core::{DeviceError, DeviceErrorKind};

use crate::engine::{Endpoint, TransferEngine, TransferSession};

type Buffer = Arc<Mutex<Vec<u8>>>;

/// Callback run after every successful write with the 1-based write count.
pub type WriteHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Faults to inject, keyed by 1-based call number across the engine.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Fail the Nth `write_chunk` call with a write error.
    pub fail_write_on: Option<usize>,
    /// Fail the Nth `read_chunk` call with a read error.
    pub fail_read_on: Option<usize>,
    /// Silently corrupt the data of the Nth `write_chunk` call.
    pub corrupt_write_on: Option<usize>,
    /// Report the destination as vanished on the Nth `write_chunk` call.
    pub vanish_on_write: Option<usize>,
}

/// Counters of chunk calls made against the engine.
#[derive(Debug, Default)]
pub struct IoStats {
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl IoStats {
    /// Number of `read_chunk` calls attempted.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `write_chunk` calls attempted.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

/// Engine over in-memory devices.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    devices: Arc<Mutex<HashMap<String, Buffer>>>,
    latency: Duration,
    faults: FaultPlan,
    write_hook: Option<WriteHook>,
    stats: Arc<IoStats>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("latency", &self.latency)
            .field("faults", &self.faults)
            .field("stats", &self.stats)
            .finish()
    }
}

impl MemoryEngine {
    /// Create an engine with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device with the given content.
    pub fn with_device(self, id: impl Into<String>, data: Vec<u8>) -> Self {
        lock(&self.devices).insert(id.into(), Arc::new(Mutex::new(data)));
        self
    }

    /// Register a device of `size` bytes filled with a repeating pattern.
    pub fn with_pattern_device(self, id: impl Into<String>, size: usize) -> Self {
        let data = (0..size).map(|i| (i % 251) as u8).collect();
        self.with_device(id, data)
    }

    /// Register a zero-filled device of `size` bytes.
    pub fn with_blank_device(self, id: impl Into<String>, size: usize) -> Self {
        self.with_device(id, vec![0u8; size])
    }

    /// Sleep this long inside every chunk call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Inject faults.
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Run `hook` after every successful write.
    pub fn on_write(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.write_hook = Some(Arc::new(hook));
        self
    }

    /// Call counters shared by all sessions of this engine.
    pub fn stats(&self) -> Arc<IoStats> {
        Arc::clone(&self.stats)
    }

    /// Current content of a device.
    pub fn device_data(&self, id: &str) -> Option<Vec<u8>> {
        lock(&self.devices).get(id).map(|buf| lock(buf).clone())
    }

    /// Remove a device, as if it was unplugged.
    pub fn remove_device(&self, id: &str) -> bool {
        lock(&self.devices).remove(id).is_some()
    }
}

impl TransferEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, source_id: &str, dest_id: &str) -> Result<Box<dyn TransferSession>, DeviceError> {
        let devices = lock(&self.devices);
        let source = devices
            .get(source_id)
            .cloned()
            .ok_or_else(|| DeviceError::new(DeviceErrorKind::Open, source_id, "no such device"))?;
        let dest = devices
            .get(dest_id)
            .cloned()
            .ok_or_else(|| DeviceError::new(DeviceErrorKind::Open, dest_id, "no such device"))?;
        drop(devices);

        let total_size = lock(&source).len() as u64;
        let capacity = lock(&dest).len() as u64;
        if capacity < total_size {
            return Err(DeviceError::new(
                DeviceErrorKind::TooSmall,
                dest_id,
                format!("{capacity} bytes available, {total_size} bytes needed"),
            ));
        }

        Ok(Box::new(MemorySession {
            engine: self.clone(),
            source,
            dest,
            source_id: source_id.to_string(),
            dest_id: dest_id.to_string(),
            total_size,
        }))
    }
}

struct MemorySession {
    engine: MemoryEngine,
    source: Buffer,
    dest: Buffer,
    source_id: String,
    dest_id: String,
    total_size: u64,
}

impl MemorySession {
    fn simulate_latency(&self) {
        if !self.engine.latency.is_zero() {
            std::thread::sleep(self.engine.latency);
        }
    }
}

impl TransferSession for MemorySession {
    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn read_chunk(&mut self, endpoint: Endpoint, offset: u64, len: usize) -> Result<Vec<u8>, DeviceError> {
        let call = self.engine.stats.reads.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate_latency();

        let (buffer, id) = match endpoint {
            Endpoint::Source => (&self.source, &self.source_id),
            Endpoint::Destination => (&self.dest, &self.dest_id),
        };

        if self.engine.faults.fail_read_on == Some(call) {
            return Err(DeviceError::new(DeviceErrorKind::Read, id.as_str(), "injected read error").at(offset));
        }

        let data = lock(buffer);
        let start = offset as usize;
        let end = start.saturating_add(len);
        if end > data.len() {
            return Err(DeviceError::new(
                DeviceErrorKind::ShortRead,
                id.as_str(),
                format!("requested {len} bytes, device holds {}", data.len()),
            )
            .at(offset));
        }

        Ok(data[start..end].to_vec())
    }

    fn write_chunk(&mut self, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let call = self.engine.stats.writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate_latency();

        let faults = &self.engine.faults;
        if faults.fail_write_on == Some(call) {
            return Err(DeviceError::new(DeviceErrorKind::Write, self.dest_id.as_str(), "injected write error").at(offset));
        }
        if faults.vanish_on_write == Some(call) {
            return Err(DeviceError::new(DeviceErrorKind::Vanished, self.dest_id.as_str(), "device disappeared").at(offset));
        }

        {
            let mut dest = lock(&self.dest);
            let start = offset as usize;
            let end = start + data.len();
            if end > dest.len() {
                return Err(DeviceError::new(
                    DeviceErrorKind::Write,
                    self.dest_id.as_str(),
                    "write past end of device",
                )
                .at(offset));
            }
            dest[start..end].copy_from_slice(data);
            if faults.corrupt_write_on == Some(call) && end > start {
                dest[start] ^= 0xff;
            }
        }

        if let Some(hook) = &self.engine.write_hook {
            hook(call);
        }

        Ok(())
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_unknown_device() {
        let engine = MemoryEngine::new().with_pattern_device("a", 10);
        let err = engine.open("a", "b").err().unwrap();
        assert_eq!(err.kind, DeviceErrorKind::Open);
        assert_eq!(err.device, "b");
    }

    #[test]
    fn test_destination_too_small() {
        let engine = MemoryEngine::new()
            .with_pattern_device("a", 100)
            .with_blank_device("b", 50);
        let err = engine.open("a", "b").err().unwrap();
        assert_eq!(err.kind, DeviceErrorKind::TooSmall);
    }

    #[test]
    fn test_fail_write_on_call() {
        let engine = MemoryEngine::new()
            .with_pattern_device("a", 30)
            .with_blank_device("b", 30)
            .with_faults(FaultPlan {
                fail_write_on: Some(2),
                ..Default::default()
            });

        let mut session = engine.open("a", "b").unwrap();
        assert!(session.write_chunk(0, &[1; 10]).is_ok());
        let err = session.write_chunk(10, &[1; 10]).unwrap_err();
        assert_eq!(err.offset, Some(10));
        assert_eq!(engine.stats().writes(), 2);
    }

    #[test]
    fn test_corrupt_write_flips_first_byte() {
        let engine = MemoryEngine::new()
            .with_pattern_device("a", 4)
            .with_blank_device("b", 4)
            .with_faults(FaultPlan {
                corrupt_write_on: Some(1),
                ..Default::default()
            });

        let mut session = engine.open("a", "b").unwrap();
        session.write_chunk(0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(engine.device_data("b").unwrap(), vec![0xfe, 2, 3, 4]);
    }

    #[test]
    fn test_write_hook_sees_call_numbers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let engine = MemoryEngine::new()
            .with_pattern_device("a", 20)
            .with_blank_device("b", 20)
            .on_write(move |call| sink.lock().unwrap().push(call));

        let mut session = engine.open("a", "b").unwrap();
        session.write_chunk(0, &[0; 10]).unwrap();
        session.write_chunk(10, &[0; 10]).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
