//! In-memory stand-ins for the platform capabilities.
//!
//! Every mock is a cheap handle over shared state, so a test can keep one
//! clone to drive the "game" while the source under test owns another.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use adaptive_trigger_telemetry_core::{ConnectError, ReadError};
use parking_lot::Mutex;

use crate::platform::{
    ProcessAttacher, ProcessMemory, ProcessProbe, SharedMemoryProvider, SharedMemoryView,
    matches_process_name,
};

/// Process probe whose answer is set by the test.
#[derive(Debug, Clone, Default)]
pub struct MockProcessProbe {
    running: Arc<AtomicBool>,
}

impl MockProcessProbe {
    pub fn new(running: bool) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(running)),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

impl ProcessProbe for MockProcessProbe {
    fn is_running(&self, _names: &[&str]) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

type Segment = Arc<Mutex<Vec<u8>>>;

/// Named segments held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MockSharedMemory {
    segments: Arc<Mutex<HashMap<String, Segment>>>,
}

impl MockSharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `name` or replace its contents. Open views see the new bytes.
    pub fn publish(&self, name: &str, bytes: Vec<u8>) {
        let mut segments = self.segments.lock();
        match segments.get(name) {
            Some(segment) => *segment.lock() = bytes,
            None => {
                segments.insert(name.to_string(), Arc::new(Mutex::new(bytes)));
            }
        }
    }

    /// Make `name` unavailable to future `open` calls.
    pub fn remove(&self, name: &str) {
        self.segments.lock().remove(name);
    }
}

#[derive(Debug)]
pub struct MockView {
    data: Segment,
    len: usize,
}

impl SharedMemoryView for MockView {
    fn len(&self) -> usize {
        self.len
    }

    fn read_into(&self, buf: &mut [u8]) -> usize {
        let data = self.data.lock();
        let n = buf.len().min(self.len).min(data.len());
        match (buf.get_mut(..n), data.get(..n)) {
            (Some(dst), Some(src)) => {
                dst.copy_from_slice(src);
                n
            }
            _ => 0,
        }
    }
}

impl SharedMemoryProvider for MockSharedMemory {
    type View = MockView;

    fn open(&self, name: &str, size: usize) -> Result<MockView, ConnectError> {
        let segments = self.segments.lock();
        let data = segments
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectError::segment_unavailable(name))?;
        Ok(MockView { data, len: size })
    }
}

#[derive(Debug, Default)]
struct ProcessState {
    memory: HashMap<u64, u8>,
    alive: bool,
}

/// Sparse byte-addressed memory of a fake process.
#[derive(Debug, Clone)]
pub struct MockProcess {
    name: String,
    pid: u32,
    module_base: u64,
    state: Arc<Mutex<ProcessState>>,
}

impl MockProcess {
    pub fn new(name: impl Into<String>, pid: u32, module_base: u64) -> Self {
        Self {
            name: name.into(),
            pid,
            module_base,
            state: Arc::new(Mutex::new(ProcessState {
                memory: HashMap::new(),
                alive: true,
            })),
        }
    }

    pub fn write(&self, address: u64, bytes: &[u8]) {
        let mut state = self.state.lock();
        for (addr, byte) in (address..).zip(bytes) {
            state.memory.insert(addr, *byte);
        }
    }

    pub fn write_u32(&self, address: u64, value: u32) {
        self.write(address, &value.to_le_bytes());
    }

    pub fn write_i32(&self, address: u64, value: i32) {
        self.write(address, &value.to_le_bytes());
    }

    pub fn write_f32(&self, address: u64, value: f32) {
        self.write(address, &value.to_le_bytes());
    }

    /// Forget `len` bytes starting at `address`, making them unreadable.
    pub fn unmap(&self, address: u64, len: u64) {
        let mut state = self.state.lock();
        for addr in address..address.saturating_add(len) {
            state.memory.remove(&addr);
        }
    }

    pub fn kill(&self) {
        self.state.lock().alive = false;
    }

    pub fn revive(&self) {
        self.state.lock().alive = true;
    }
}

impl ProcessMemory for MockProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn module_base(&self) -> u64 {
        self.module_base
    }

    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        let state = self.state.lock();
        if !state.alive {
            return Err(ReadError::ProcessExited(self.name.clone()));
        }
        let len = buf.len();
        for (addr, slot) in (address..).zip(buf.iter_mut()) {
            *slot = *state
                .memory
                .get(&addr)
                .ok_or(ReadError::MemoryRead { address, len })?;
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.state.lock().alive
    }
}

/// Hands out clones of one [`MockProcess`] while it is alive.
#[derive(Debug, Clone)]
pub struct MockProcessAttacher {
    process: MockProcess,
}

impl MockProcessAttacher {
    pub fn new(process: MockProcess) -> Self {
        Self { process }
    }
}

impl ProcessAttacher for MockProcessAttacher {
    type Memory = MockProcess;

    fn attach(&self, process_name: &str) -> Result<MockProcess, ConnectError> {
        if matches_process_name(&self.process.name, process_name) && self.process.is_alive() {
            Ok(self.process.clone())
        } else {
            Err(ConnectError::process_not_found(process_name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_view_sees_republished_bytes() -> TestResult {
        let shm = MockSharedMemory::new();
        shm.publish("seg", vec![1, 2, 3, 4]);
        let view = shm.open("seg", 4)?;
        shm.publish("seg", vec![9, 8, 7, 6]);

        let mut buf = [0u8; 4];
        assert_eq!(view.read_into(&mut buf), 4);
        assert_eq!(buf, [9, 8, 7, 6]);
        Ok(())
    }

    #[test]
    fn test_open_missing_segment() {
        let shm = MockSharedMemory::new();
        assert!(matches!(
            shm.open("nope", 8),
            Err(ConnectError::SegmentUnavailable(_))
        ));
    }

    #[test]
    fn test_process_reads_and_gaps() -> TestResult {
        let process = MockProcess::new("game.exe", 7, 0x40_0000);
        process.write_u32(0x1000, 0xDEAD_BEEF);
        assert_eq!(process.read_u32(0x1000)?, 0xDEAD_BEEF);
        assert!(matches!(
            process.read_u32(0x1002),
            Err(ReadError::MemoryRead { address: 0x1002, len: 4 })
        ));
        process.kill();
        assert!(matches!(
            process.read_u32(0x1000),
            Err(ReadError::ProcessExited(_))
        ));
        Ok(())
    }

    #[test]
    fn test_attacher_requires_live_matching_process() {
        let process = MockProcess::new("game.exe", 7, 0);
        let attacher = MockProcessAttacher::new(process.clone());
        assert!(attacher.attach("GAME.EXE").is_ok());
        assert!(attacher.attach("other.exe").is_err());
        process.kill();
        assert!(attacher.attach("game.exe").is_err());
    }
}
