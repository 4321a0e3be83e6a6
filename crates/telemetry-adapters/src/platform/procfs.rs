//! `/proc` based implementations for non-Windows hosts.
//!
//! Covers simulators running under Wine/Proton: process names come from
//! `/proc/<pid>/comm`, memory from `/proc/<pid>/mem`. Named Win32 shared
//! memory has no host-side equivalent, so segments are reported unsupported.

use std::fs::{self, File};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use adaptive_trigger_telemetry_core::{ConnectError, ReadError};
use tracing::debug;

use super::{
    ProcessAttacher, ProcessMemory, ProcessProbe, SharedMemoryProvider, SharedMemoryView,
    matches_process_name,
};

const PROC_ROOT: &str = "/proc";

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    fn is_running(&self, names: &[&str]) -> bool {
        find_pid(names).is_some()
    }
}

fn find_pid(names: &[&str]) -> Option<u32> {
    let entries = fs::read_dir(PROC_ROOT).ok()?;
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if let Ok(comm) = fs::read_to_string(entry.path().join("comm"))
            && names.iter().any(|name| matches_process_name(&comm, name))
        {
            return Some(pid);
        }
    }
    None
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSharedMemory;

/// Uninhabited: no segment can be mapped on this platform.
#[derive(Debug)]
pub enum MappedView {}

impl SharedMemoryView for MappedView {
    fn len(&self) -> usize {
        match *self {}
    }

    fn read_into(&self, _buf: &mut [u8]) -> usize {
        match *self {}
    }
}

impl SharedMemoryProvider for SystemSharedMemory {
    type View = MappedView;

    fn open(&self, name: &str, _size: usize) -> Result<MappedView, ConnectError> {
        Err(ConnectError::Unsupported(format!(
            "named shared memory {name} requires Windows"
        )))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessAttacher;

impl ProcessAttacher for SystemProcessAttacher {
    type Memory = ProcessHandle;

    fn attach(&self, process_name: &str) -> Result<ProcessHandle, ConnectError> {
        let pid = find_pid(&[process_name])
            .ok_or_else(|| ConnectError::process_not_found(process_name))?;
        let proc_dir = Path::new(PROC_ROOT).join(pid.to_string());

        let mem = File::open(proc_dir.join("mem"))
            .map_err(|e| ConnectError::access_denied(process_name, e.to_string()))?;

        let maps = fs::read_to_string(proc_dir.join("maps"))
            .map_err(|e| ConnectError::access_denied(process_name, e.to_string()))?;
        let module_base = module_base_from_maps(&maps, process_name)
            .ok_or_else(|| ConnectError::ModuleBaseNotFound(process_name.to_string()))?;

        debug!(pid, module_base = format_args!("{module_base:#x}"), "Attached via procfs");
        Ok(ProcessHandle {
            pid,
            proc_dir,
            mem,
            module_base,
        })
    }
}

/// Lowest mapping whose backing file is `process_name`.
fn module_base_from_maps(maps: &str, process_name: &str) -> Option<u64> {
    maps.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let range = parts.next()?;
            let path = parts.nth(4)?;
            let file = path.rsplit(['/', '\\']).next()?;
            if !file.eq_ignore_ascii_case(process_name) {
                return None;
            }
            let (start, _) = range.split_once('-')?;
            u64::from_str_radix(start, 16).ok()
        })
        .min()
}

/// Open `/proc/<pid>/mem` of an attached process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    proc_dir: PathBuf,
    mem: File,
    module_base: u64,
}

impl ProcessMemory for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn module_base(&self) -> u64 {
        self.module_base
    }

    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        self.mem.read_exact_at(buf, address).map_err(|_| {
            if self.is_alive() {
                ReadError::MemoryRead {
                    address,
                    len: buf.len(),
                }
            } else {
                ReadError::ProcessExited(format!("pid {}", self.pid))
            }
        })
    }

    fn is_alive(&self) -> bool {
        self.proc_dir.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const MAPS: &str = "\
00010000-00011000 r--p 00000000 08:01 1234 /usr/lib/wine/x86_64-windows/ntdll.dll
00400000-00401000 r--p 00000000 08:01 5678 /games/rbr/RichardBurnsRally_SSE.exe
00401000-00900000 r-xp 00001000 08:01 5678 /games/rbr/RichardBurnsRally_SSE.exe
7f0000000000-7f0000001000 rw-p 00000000 00:00 0
";

    #[test]
    fn test_module_base_picks_lowest_matching_mapping() -> TestResult {
        let base = module_base_from_maps(MAPS, "richardburnsrally_sse.exe")
            .ok_or("module base not found")?;
        assert_eq!(base, 0x0040_0000);
        Ok(())
    }

    #[test]
    fn test_module_base_missing() {
        assert_eq!(module_base_from_maps(MAPS, "acs.exe"), None);
        assert_eq!(module_base_from_maps("", "acs.exe"), None);
    }

    #[test]
    fn test_shared_memory_is_unsupported() {
        let result = SystemSharedMemory.open("Local\\acpmf_physics", 256);
        assert!(matches!(result, Err(ConnectError::Unsupported(_))));
    }

    #[test]
    fn test_attach_unknown_process_fails() {
        let result = SystemProcessAttacher.attach("definitely-not-running.exe");
        assert!(matches!(result, Err(ConnectError::ProcessNotFound(_))));
    }
}
