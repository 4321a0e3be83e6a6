//! Win32 implementations: Toolhelp snapshots, file mappings and
//! `ReadProcessMemory`.
#![expect(unsafe_code, reason = "Win32 FFI for shared memory and process memory")]

use std::ffi::OsStr;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

use adaptive_trigger_telemetry_core::{ConnectError, ReadError};
use tracing::debug;
use winapi::shared::basetsd::SIZE_T;
use winapi::shared::minwindef::{DWORD, FALSE, LPCVOID};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::memoryapi::{
    FILE_MAP_READ, MapViewOfFile, OpenFileMappingW, ReadProcessMemory, UnmapViewOfFile,
};
use winapi::um::minwinbase::STILL_ACTIVE;
use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
use winapi::um::tlhelp32::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
    Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use winapi::um::winnt::{HANDLE, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};

use super::{
    ProcessAttacher, ProcessMemory, ProcessProbe, SharedMemoryProvider, SharedMemoryView,
    matches_process_name,
};

/// Closes the wrapped handle on drop.
#[derive(Debug)]
struct HandleGuard(HANDLE);

// SAFETY: kernel handles are process-wide and may be used from any thread.
unsafe impl Send for HandleGuard {}
// SAFETY: the guard never mutates the handle; Win32 calls on it are thread-safe.
unsafe impl Sync for HandleGuard {}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        // SAFETY: the guard owns the handle and closes it exactly once.
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn last_error() -> String {
    // SAFETY: GetLastError has no preconditions.
    let code = unsafe { GetLastError() };
    format!("Win32 error {code}")
}

fn wide_to_string(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(buf.get(..end).unwrap_or_default())
}

fn wide_name(name: &str) -> Vec<u16> {
    OsStr::new(name)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn find_pid(names: &[&str]) -> Option<u32> {
    // SAFETY: valid flags; pid 0 selects every process.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
    if snapshot == INVALID_HANDLE_VALUE {
        return None;
    }
    let snapshot = HandleGuard(snapshot);

    // SAFETY: PROCESSENTRY32W is plain data and all-zero is a valid value.
    let mut entry: PROCESSENTRY32W = unsafe { mem::zeroed() };
    entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as DWORD;

    // SAFETY: snapshot is valid and entry.dwSize is initialised.
    let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) } != 0;
    while more {
        let exe = wide_to_string(&entry.szExeFile);
        if names.iter().any(|name| matches_process_name(&exe, name)) {
            return Some(entry.th32ProcessID);
        }
        // SAFETY: same snapshot and entry as above.
        more = unsafe { Process32NextW(snapshot.0, &mut entry) } != 0;
    }
    None
}

/// Base address of `process_name` inside `pid`, falling back to the first
/// module, which Toolhelp always reports as the main executable.
fn find_module_base(pid: u32, process_name: &str) -> Option<u64> {
    // SAFETY: valid flags and pid.
    let snapshot =
        unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) };
    if snapshot == INVALID_HANDLE_VALUE {
        return None;
    }
    let snapshot = HandleGuard(snapshot);

    // SAFETY: MODULEENTRY32W is plain data and all-zero is a valid value.
    let mut entry: MODULEENTRY32W = unsafe { mem::zeroed() };
    entry.dwSize = mem::size_of::<MODULEENTRY32W>() as DWORD;

    let mut first = None;
    // SAFETY: snapshot is valid and entry.dwSize is initialised.
    let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) } != 0;
    while more {
        let base = entry.modBaseAddr as usize as u64;
        first.get_or_insert(base);
        if wide_to_string(&entry.szModule).eq_ignore_ascii_case(process_name) {
            return Some(base);
        }
        // SAFETY: same snapshot and entry as above.
        more = unsafe { Module32NextW(snapshot.0, &mut entry) } != 0;
    }
    first
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    fn is_running(&self, names: &[&str]) -> bool {
        find_pid(names).is_some()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSharedMemory;

/// A mapped view of a named file mapping.
#[derive(Debug)]
pub struct MappedView {
    base: *const u8,
    len: usize,
    // Dropped after the view is unmapped.
    _mapping: HandleGuard,
}

// SAFETY: the view is read-only and only copied out of; the mapping lives as
// long as the value.
unsafe impl Send for MappedView {}

impl Drop for MappedView {
    fn drop(&mut self) {
        // SAFETY: base came from MapViewOfFile and is unmapped exactly once.
        unsafe {
            UnmapViewOfFile(self.base.cast());
        }
    }
}

impl SharedMemoryView for MappedView {
    fn len(&self) -> usize {
        self.len
    }

    fn read_into(&self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len);
        // SAFETY: base is valid for `len` bytes while the view is alive, n <= len
        // and buf has room for n bytes; the regions cannot overlap.
        unsafe { ptr::copy_nonoverlapping(self.base, buf.as_mut_ptr(), n) };
        n
    }
}

impl SharedMemoryProvider for SystemSharedMemory {
    type View = MappedView;

    fn open(&self, name: &str, size: usize) -> Result<MappedView, ConnectError> {
        let wide = wide_name(name);
        // SAFETY: `wide` is NUL terminated and outlives the call.
        let handle = unsafe { OpenFileMappingW(FILE_MAP_READ, FALSE, wide.as_ptr()) };
        if handle.is_null() {
            return Err(ConnectError::segment_unavailable(name));
        }
        let mapping = HandleGuard(handle);

        // SAFETY: mapping is a live file-mapping handle opened for reading.
        let base = unsafe { MapViewOfFile(mapping.0, FILE_MAP_READ, 0, 0, size as SIZE_T) };
        if base.is_null() {
            return Err(ConnectError::access_denied(name, last_error()));
        }

        debug!(segment = name, size, "Mapped shared memory view");
        Ok(MappedView {
            base: base.cast::<u8>().cast_const(),
            len: size,
            _mapping: mapping,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessAttacher;

impl ProcessAttacher for SystemProcessAttacher {
    type Memory = ProcessHandle;

    fn attach(&self, process_name: &str) -> Result<ProcessHandle, ConnectError> {
        let pid =
            find_pid(&[process_name]).ok_or_else(|| ConnectError::process_not_found(process_name))?;

        // SAFETY: plain FFI call; a null result is handled below.
        let handle = unsafe { OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, FALSE, pid) };
        if handle.is_null() {
            return Err(ConnectError::access_denied(process_name, last_error()));
        }
        let handle = HandleGuard(handle);

        let module_base = find_module_base(pid, process_name)
            .ok_or_else(|| ConnectError::ModuleBaseNotFound(process_name.to_string()))?;

        debug!(pid, module_base = format_args!("{module_base:#x}"), "Attached to process");
        Ok(ProcessHandle {
            pid,
            module_base,
            handle,
        })
    }
}

/// A process opened with `PROCESS_VM_READ | PROCESS_QUERY_INFORMATION`.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    module_base: u64,
    handle: HandleGuard,
}

impl ProcessMemory for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn module_base(&self) -> u64 {
        self.module_base
    }

    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), ReadError> {
        let mut read: SIZE_T = 0;
        // SAFETY: the handle grants PROCESS_VM_READ and buf is valid for
        // buf.len() writable bytes.
        let ok = unsafe {
            ReadProcessMemory(
                self.handle.0,
                address as usize as LPCVOID,
                buf.as_mut_ptr().cast(),
                buf.len(),
                &mut read,
            )
        };
        if ok != 0 && read == buf.len() {
            Ok(())
        } else if self.is_alive() {
            Err(ReadError::MemoryRead {
                address,
                len: buf.len(),
            })
        } else {
            Err(ReadError::ProcessExited(format!("pid {}", self.pid)))
        }
    }

    fn is_alive(&self) -> bool {
        let mut code: DWORD = 0;
        // SAFETY: the handle grants PROCESS_QUERY_INFORMATION and code is a
        // valid out pointer.
        let ok = unsafe { GetExitCodeProcess(self.handle.0, &mut code) };
        ok != 0 && code == STILL_ACTIVE
    }
}
