// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (win32) toolhelp wow argv Nt

//! Toolhelp and process-handle backed process source.

use crate::error::{Error, Result};
use crate::layout::{ProcessEntry32W, VmCounters, PROCESS_ENTRY_32W, UNICODE_STRING, VM_COUNTERS};
use crate::platform::helpers::{two_phase, wide_string_to_rust};
use crate::platform::ProcessSource;
use crate::process::{ArgsEnv, ProcessAttributes, ProcessState};
use crate::version::{OsVersion, Platform};
use std::collections::BTreeMap;
use std::ffi::c_void;
use std::mem::{size_of, MaybeUninit};
use std::ptr::NonNull;
use std::slice;

use windows_sys::Wdk::System::Threading::{NtQueryInformationProcess, PROCESSINFOCLASS};
use windows_sys::Win32::Foundation::{CloseHandle, LocalFree, FILETIME, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::GetTempPathW;
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows_sys::Win32::System::Threading::{
    GetCurrentProcessId, GetProcessHandleCount, GetProcessIoCounters, GetProcessTimes,
    IsWow64Process, OpenProcess, QueryFullProcessImageNameW, IO_COUNTERS,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows_sys::Win32::System::WindowsProgramming::GetComputerNameW;
use windows_sys::Win32::UI::Shell::CommandLineToArgvW;

const PROCESS_VM_COUNTERS: PROCESSINFOCLASS = 3;
const PROCESS_COMMAND_LINE_INFORMATION: PROCESSINFOCLASS = 60;
const STATUS_INFO_LENGTH_MISMATCH: i32 = 0xC000_0004_u32 as i32;
/// 100 ns intervals between 1601-01-01 and 1970-01-01.
const EPOCH_DIFFERENCE: u64 = 116_444_736_000_000_000;
const MAX_LONG_PATH: usize = 32_768;
const ERROR_INVALID_PARAMETER: i32 = 87;

/// Owned kernel handle, closed on every exit path.
struct HandleWrapper(NonNull<c_void>);
// SAFETY: a kernel handle may be used and closed from any thread.
unsafe impl Send for HandleWrapper {}

impl HandleWrapper {
    fn as_raw(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl Drop for HandleWrapper {
    fn drop(&mut self) {
        // SAFETY: the handle is owned and closed exactly once.
        unsafe {
            CloseHandle(self.0.as_ptr());
        };
    }
}

/// Open `pid` for querying. Limited information covers every call made on
/// the handle and is granted for protected and elevated processes too.
fn open_process(pid: i32) -> Result<HandleWrapper> {
    // SAFETY: plain FFI call; a null return is handled below.
    let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid as u32) };
    NonNull::new(handle)
        .map(HandleWrapper)
        .ok_or_else(|| Error::last_os_error("OpenProcess"))
}

/// View a plain-old-data record as its bytes, for reading through a layout.
fn record_bytes<T: Copy>(record: &T) -> &[u8] {
    // SAFETY: `T` is a `#[repr(C)]` mirror of plain integers.
    unsafe { slice::from_raw_parts((record as *const T).cast::<u8>(), size_of::<T>()) }
}

/// One row of the toolhelp process table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ToolhelpEntry {
    parent_process_id: i32,
    thread_count: u32,
    priority: i32,
    exe_file: String,
}

type ProcessTable = BTreeMap<i32, ToolhelpEntry>;

fn decode_entry(entry: &ProcessEntry32W) -> (i32, ToolhelpEntry) {
    let bytes = record_bytes(entry);
    let layout = &*PROCESS_ENTRY_32W;
    (
        layout.read_u32(bytes, "th32ProcessID") as i32,
        ToolhelpEntry {
            parent_process_id: layout.read_u32(bytes, "th32ParentProcessID") as i32,
            thread_count: layout.read_u32(bytes, "cntThreads"),
            priority: layout.read_i32(bytes, "pcPriClassBase"),
            exe_file: layout.read_wide_string(bytes, "szExeFile"),
        },
    )
}

/// Take a toolhelp snapshot of the live process table.
fn read_toolhelp() -> Result<ProcessTable> {
    // SAFETY: plain FFI call; the result is checked below.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
    if snapshot == INVALID_HANDLE_VALUE {
        return Err(Error::last_os_error("CreateToolhelp32Snapshot"));
    }
    let snapshot = NonNull::new(snapshot)
        .map(HandleWrapper)
        .ok_or_else(|| Error::last_os_error("CreateToolhelp32Snapshot"))?;

    let mut entry = MaybeUninit::<ProcessEntry32W>::zeroed();
    // The mirror matches `PROCESSENTRY32W` byte for byte.
    let raw = entry.as_mut_ptr().cast::<PROCESSENTRY32W>();
    // SAFETY: `raw` points to a zeroed record we own.
    unsafe { (*raw).dwSize = size_of::<ProcessEntry32W>() as u32 };

    let mut table = BTreeMap::new();
    // SAFETY: the snapshot handle is open and `raw` has its size set.
    let mut more = unsafe { Process32FirstW(snapshot.as_raw(), raw) } != 0;
    if !more {
        return Err(Error::last_os_error("Process32FirstW"));
    }
    while more {
        // SAFETY: the record was zeroed and then filled by the walk.
        let (pid, row) = decode_entry(unsafe { entry.assume_init_ref() });
        table.insert(pid, row);
        // SAFETY: as for `Process32FirstW`.
        more = unsafe { Process32NextW(snapshot.as_raw(), raw) } != 0;
    }
    Ok(table)
}

fn filetime_to_u64(time: &FILETIME) -> u64 {
    (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime)
}

/// FILETIME instant to epoch milliseconds.
fn filetime_to_epoch_millis(time: &FILETIME) -> u64 {
    filetime_to_u64(time).saturating_sub(EPOCH_DIFFERENCE) / 10_000
}

fn image_path(handle: &HandleWrapper) -> Result<String> {
    let mut buf = vec![0u16; MAX_LONG_PATH];
    let mut len = buf.len() as u32;
    // SAFETY: `buf` holds `len` units and outlives the call.
    let ok = unsafe { QueryFullProcessImageNameW(handle.as_raw(), 0, buf.as_mut_ptr(), &mut len) };
    if ok == 0 {
        return Err(Error::last_os_error("QueryFullProcessImageNameW"));
    }
    Ok(String::from_utf16_lossy(&buf[..len as usize]))
}

fn vm_counters(handle: &HandleWrapper) -> Result<VmCounters> {
    let mut counters = MaybeUninit::<VmCounters>::zeroed();
    let mut returned = 0u32;
    // SAFETY: the out buffer is a zeroed `VM_COUNTERS` mirror of the size passed.
    let status = unsafe {
        NtQueryInformationProcess(
            handle.as_raw(),
            PROCESS_VM_COUNTERS,
            counters.as_mut_ptr().cast::<c_void>(),
            size_of::<VmCounters>() as u32,
            &mut returned,
        )
    };
    if status != 0 {
        return Err(Error::Native {
            call: "NtQueryInformationProcess",
            code: status,
        });
    }
    // SAFETY: zero-initialised, then filled by a successful query.
    Ok(unsafe { counters.assume_init() })
}

/// Fill in what an open handle can tell about the process.
fn read_handle_attributes(handle: &HandleWrapper, attrs: &mut ProcessAttributes) {
    let raw = handle.as_raw();

    match image_path(handle) {
        Ok(path) => attrs.path = path,
        Err(err) => log::trace!("{err}"),
    }

    let zero = FILETIME {
        dwLowDateTime: 0,
        dwHighDateTime: 0,
    };
    let (mut creation, mut exit, mut kernel, mut user) = (zero, zero, zero, zero);
    // SAFETY: every out pointer is a live local.
    if unsafe { GetProcessTimes(raw, &mut creation, &mut exit, &mut kernel, &mut user) } != 0 {
        attrs.start_time = filetime_to_epoch_millis(&creation);
        attrs.kernel_time = filetime_to_u64(&kernel) / 10_000;
        attrs.user_time = filetime_to_u64(&user) / 10_000;
    }

    match vm_counters(handle) {
        Ok(counters) => {
            let bytes = record_bytes(&counters);
            let layout = &*VM_COUNTERS;
            attrs.virtual_size = layout.read_usize(bytes, "VirtualSize") as u64;
            attrs.resident_set_size = layout.read_usize(bytes, "WorkingSetSize") as u64;
            attrs.minor_faults = u64::from(layout.read_u32(bytes, "PageFaultCount"));
        }
        Err(err) => log::trace!("{err}"),
    }

    let mut io = MaybeUninit::<IO_COUNTERS>::zeroed();
    // SAFETY: `io` is a live out record of the expected type.
    if unsafe { GetProcessIoCounters(raw, io.as_mut_ptr()) } != 0 {
        // SAFETY: zero-initialised, then filled by a successful call.
        let io = unsafe { io.assume_init() };
        attrs.bytes_read = io.ReadTransferCount;
        attrs.bytes_written = io.WriteTransferCount;
    }

    let mut handles = 0u32;
    // SAFETY: `handles` is a live out value.
    if unsafe { GetProcessHandleCount(raw, &mut handles) } != 0 {
        attrs.open_files = u64::from(handles);
    }

    let mut wow64 = 0;
    // SAFETY: `wow64` is a live out value.
    if unsafe { IsWow64Process(raw, &mut wow64) } != 0 {
        attrs.bitness = if wow64 != 0 || cfg!(target_pointer_width = "32") {
            32
        } else {
            64
        };
    }
}

/// Combine a toolhelp row with what `handle` reveals.
///
/// A handle that cannot be opened because the process is gone invalidates
/// the row; any other failure, such as access denied, keeps it.
fn resolve_entry(
    pid: i32,
    entry: &ToolhelpEntry,
    handle: Result<HandleWrapper>,
) -> Result<ProcessAttributes> {
    if entry.thread_count == 0 {
        return Err(Error::malformed("PROCESSENTRY32W", "no threads"));
    }

    let mut attrs = ProcessAttributes {
        name: entry.exe_file.clone(),
        state: ProcessState::Running,
        parent_process_id: entry.parent_process_id,
        thread_count: entry.thread_count,
        priority: entry.priority,
        ..ProcessAttributes::default()
    };
    match handle {
        Ok(handle) => read_handle_attributes(&handle, &mut attrs),
        Err(err) if err.is_gone() => return Err(err),
        Err(err) => log::trace!("process {pid}: {err}"),
    }
    if attrs.path.is_empty() {
        attrs.path = attrs.name.clone();
    } else if let Some(base) = attrs.path.rsplit('\\').next().filter(|base| !base.is_empty()) {
        attrs.name = base.to_string();
    }
    Ok(attrs)
}

fn read_attributes(table: &ProcessTable, pid: i32) -> Result<ProcessAttributes> {
    let Some(entry) = table.get(&pid) else {
        return Err(Error::Native {
            call: "Process32NextW",
            code: ERROR_INVALID_PARAMETER,
        });
    };
    resolve_entry(pid, entry, open_process(pid))
}

/// Raw `UNICODE_STRING` command line of `pid`, decoded to UTF-16 units.
fn command_line_units(pid: i32) -> Result<Vec<u16>> {
    let handle = open_process(pid)?;
    let query = |buf: &mut [u8], returned: &mut u32| {
        // SAFETY: `buf` is writable for its full length during the call.
        unsafe {
            NtQueryInformationProcess(
                handle.as_raw(),
                PROCESS_COMMAND_LINE_INFORMATION,
                buf.as_mut_ptr().cast::<c_void>(),
                buf.len() as u32,
                returned,
            )
        }
    };
    let buf: Vec<u8> = two_phase(
        "NtQueryInformationProcess",
        || {
            let mut needed = 0;
            match query(&mut [], &mut needed) {
                STATUS_INFO_LENGTH_MISMATCH | 0 => Ok(needed as usize),
                status => Err(Error::Native {
                    call: "NtQueryInformationProcess",
                    code: status,
                }),
            }
        },
        |buf: &mut [u8]| {
            let mut written = 0;
            match query(buf, &mut written) {
                0 => Ok(written as usize),
                status => Err(Error::Native {
                    call: "NtQueryInformationProcess",
                    code: status,
                }),
            }
        },
    )?;

    let header = &*UNICODE_STRING;
    if buf.len() < header.byte_size() {
        return Err(Error::malformed("UNICODE_STRING", "short buffer"));
    }
    let length = usize::from(header.read_u16(&buf, "Length"));
    // The string follows the header inside our buffer.
    let start = header
        .read_usize(&buf, "Buffer")
        .checked_sub(buf.as_ptr() as usize)
        .filter(|start| start + length <= buf.len())
        .ok_or_else(|| Error::malformed("UNICODE_STRING", "buffer outside the answer"))?;
    Ok(buf[start..start + length]
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect())
}

/// Split a command line with the shell's own quoting rules.
fn split_command_line(units: &[u16]) -> Vec<String> {
    if units.is_empty() {
        return Vec::new();
    }
    let mut line = units.to_vec();
    line.push(0);
    let mut argc = 0;
    // SAFETY: `line` is NUL terminated and outlives the call.
    let argv = unsafe { CommandLineToArgvW(line.as_ptr(), &mut argc) };
    if argv.is_null() {
        return Vec::new();
    }
    let args = (0..argc.max(0) as usize)
        // SAFETY: `argv` holds `argc` NUL terminated strings until freed below.
        .map(|i| unsafe {
            let arg = *argv.add(i);
            let len = (0..).take_while(|&j| *arg.add(j) != 0).count();
            String::from_utf16_lossy(slice::from_raw_parts(arg, len))
        })
        .collect();
    // SAFETY: `argv` came from `CommandLineToArgvW` and is freed once.
    unsafe { LocalFree(argv.cast::<c_void>()) };
    args
}

/// NetBIOS name of this computer.
pub fn computer_name() -> Result<String> {
    let mut buf = [0u16; 64];
    let mut len = buf.len() as u32;
    // SAFETY: `buf` holds `len` units.
    if unsafe { GetComputerNameW(buf.as_mut_ptr(), &mut len) } == 0 {
        return Err(Error::last_os_error("GetComputerNameW"));
    }
    Ok(wide_string_to_rust(&buf[..len as usize]))
}

/// Directory for temporary files, with its trailing separator.
pub fn temp_path() -> Result<String> {
    let mut buf = vec![0u16; MAX_LONG_PATH];
    // SAFETY: `buf` holds the number of units passed.
    let len = unsafe { GetTempPathW(buf.len() as u32, buf.as_mut_ptr()) };
    if len == 0 {
        return Err(Error::last_os_error("GetTempPathW"));
    }
    Ok(wide_string_to_rust(&buf[..len as usize]))
}

/// Windows exposes no version query here that does not lie to unmanifested
/// programs, so version-gated probes stay disabled.
pub fn os_release() -> Result<String> {
    Err(Error::Unsupported("operating system version query"))
}

/// Reads processes through toolhelp snapshots and process handles.
///
/// A single lookup takes its own snapshot; a batch shares one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSource;

impl ProcessSource for NativeSource {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn list_pids(&self) -> Result<Vec<i32>> {
        Ok(read_toolhelp()?.into_keys().collect())
    }

    fn current_pid(&self) -> i32 {
        // SAFETY: no preconditions.
        unsafe { GetCurrentProcessId() as i32 }
    }

    fn attributes(&self, pid: i32, version: OsVersion) -> Option<ProcessAttributes> {
        self.attributes_batch(&[pid], version).pop().flatten()
    }

    fn attributes_batch(
        &self,
        pids: &[i32],
        _version: OsVersion,
    ) -> Vec<Option<ProcessAttributes>> {
        let table = match read_toolhelp() {
            Ok(table) => table,
            Err(err) => {
                log::trace!("{err}");
                return vec![None; pids.len()];
            }
        };
        pids.iter()
            .map(|&pid| {
                read_attributes(&table, pid)
                    .map_err(|err| log::trace!("process {pid}: {err}"))
                    .ok()
            })
            .collect()
    }

    fn arguments(&self, pid: i32) -> ArgsEnv {
        match command_line_units(pid) {
            // The environment lives in the target's address space; only the
            // command line is exposed through a query class.
            Ok(units) => ArgsEnv {
                arguments: split_command_line(&units),
                ..ArgsEnv::default()
            },
            Err(err) => {
                if pid > 0 {
                    log::trace!("process {pid}: {err}");
                }
                ArgsEnv::default()
            }
        }
    }
}
