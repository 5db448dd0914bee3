// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (libproc) listpids pidinfo pidpath rusage taskallinfo vnodepathinfo procargs
// spell-checker:ignore (libproc) argmax timebase osproductversion numer

//! libproc backed process source.

use crate::error::{Error, Result};
use crate::layout::{self, StructLayout, PROC_TASK_ALL_INFO, PROC_VNODE_PATH_INFO};
use crate::memoize::Memoizer;
use crate::platform::helpers::{c_string_to_rust, two_phase};
use crate::platform::{unix, ProcessSource};
use crate::procargs;
use crate::process::{ArgsEnv, ProcessAttributes, ProcessState};
use crate::version::{OsVersion, Platform};
use libc::{c_int, c_uint, c_void};
use std::ffi::CString;
use std::mem::size_of;
use std::ptr;
use std::sync::LazyLock;

// <libproc.h> / <sys/proc_info.h>
const PROC_ALL_PIDS: u32 = 1;
const PROC_PIDTASKALLINFO: c_int = 2;
const PROC_PIDVNODEPATHINFO: c_int = 9;
const PROC_PIDPATHINFO_MAXSIZE: usize = 4096;
const RUSAGE_INFO_V2: c_int = 2;

// <sys/proc.h>
const P_LP64: u32 = 0x4;
const SIDL: u32 = 1;
const SRUN: u32 = 2;
const SSLEEP: u32 = 3;
const SSTOP: u32 = 4;
const SZOMB: u32 = 5;

// <sys/sysctl.h>
const CTL_KERN: c_int = 1;
const KERN_PROCARGS2: c_int = 49;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct MachTimebaseInfo {
    numer: u32,
    denom: u32,
}

extern "C" {
    fn mach_timebase_info(info: *mut MachTimebaseInfo) -> c_int;
}

/// Ratio converting Mach absolute time units to nanoseconds.
static TIMEBASE: LazyLock<Memoizer<MachTimebaseInfo>> = LazyLock::new(|| {
    Memoizer::forever(|| {
        let mut info = MachTimebaseInfo::default();
        // SAFETY: `info` is a valid out pointer.
        let rc = unsafe { mach_timebase_info(&mut info) };
        if rc != 0 || info.denom == 0 {
            log::debug!("mach_timebase_info failed ({rc}), assuming nanoseconds");
            MachTimebaseInfo { numer: 1, denom: 1 }
        } else {
            info
        }
    })
});

/// Largest argument/environment blob the kernel hands out.
static ARGMAX: LazyLock<Memoizer<i32>> =
    LazyLock::new(|| Memoizer::forever(|| sysctl_int("kern.argmax", 0)));

fn mach_to_millis(mach_time: u64) -> u64 {
    let timebase = TIMEBASE.get();
    let nanos = u128::from(mach_time) * u128::from(timebase.numer) / u128::from(timebase.denom);
    u64::try_from(nanos / 1_000_000).unwrap_or(u64::MAX)
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| Error::malformed("sysctl name", name))
}

/// Read a fixed-size sysctl value by name.
fn sysctl_value<T: Copy + Default>(name: &str) -> Result<T> {
    let c_name = c_name(name)?;
    let mut value = T::default();
    let mut size = size_of::<T>();
    // SAFETY: `value` is valid for `size` bytes.
    let rc = unsafe {
        libc::sysctlbyname(
            c_name.as_ptr(),
            (&mut value as *mut T).cast::<c_void>(),
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(Error::last_os_error("sysctlbyname"));
    }
    Ok(value)
}

/// Integer sysctl such as `kern.argmax`, `default` on failure.
pub fn sysctl_int(name: &str, default: i32) -> i32 {
    sysctl_value(name).unwrap_or_else(|err| {
        log::debug!("sysctl {name}: {err}");
        default
    })
}

/// 64-bit sysctl such as `hw.memsize`, `default` on failure.
pub fn sysctl_long(name: &str, default: i64) -> i64 {
    sysctl_value(name).unwrap_or_else(|err| {
        log::debug!("sysctl {name}: {err}");
        default
    })
}

/// Raw sysctl value of any size, probed then fetched.
pub fn sysctl_bytes(name: &str) -> Result<Vec<u8>> {
    let c_name = c_name(name)?;
    two_phase(
        name,
        || {
            let mut size = 0;
            // SAFETY: a null output buffer asks only for the size.
            let rc = unsafe {
                libc::sysctlbyname(c_name.as_ptr(), ptr::null_mut(), &mut size, ptr::null_mut(), 0)
            };
            if rc != 0 {
                return Err(Error::last_os_error("sysctlbyname"));
            }
            Ok(size)
        },
        |buf: &mut [u8]| {
            let mut size = buf.len();
            // SAFETY: `buf` is valid for `size` bytes.
            let rc = unsafe {
                libc::sysctlbyname(
                    c_name.as_ptr(),
                    buf.as_mut_ptr().cast::<c_void>(),
                    &mut size,
                    ptr::null_mut(),
                    0,
                )
            };
            if rc != 0 {
                return Err(Error::last_os_error("sysctlbyname"));
            }
            Ok(size)
        },
    )
}

/// String sysctl such as `kern.osproductversion`, `default` on failure.
pub fn sysctl_string(name: &str, default: &str) -> String {
    match sysctl_bytes(name) {
        Ok(bytes) => c_string_to_rust(&bytes),
        Err(err) => {
            log::debug!("sysctl {name}: {err}");
            default.to_string()
        }
    }
}

/// Read the value at a numeric MIB path into a buffer of at most `capacity` bytes.
pub fn sysctl_mib(mib: &[c_int], capacity: usize) -> Result<Vec<u8>> {
    let mut mib = mib.to_vec();
    let mut buf = vec![0u8; capacity];
    let mut size = capacity;
    // SAFETY: `mib` holds `mib.len()` entries and `buf` is valid for `size` bytes.
    let rc = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as c_uint,
            buf.as_mut_ptr().cast::<c_void>(),
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(Error::last_os_error("sysctl"));
    }
    buf.truncate(size);
    Ok(buf)
}

/// Product version, e.g. `14.2.1`.
pub fn os_release() -> Result<String> {
    sysctl_bytes("kern.osproductversion").map(|bytes| c_string_to_rust(&bytes))
}

fn list_all_pids() -> Result<Vec<i32>> {
    let pid_size = size_of::<c_int>();
    two_phase(
        "proc_listpids",
        || {
            // SAFETY: a null buffer asks only for the size.
            let bytes = unsafe { libc::proc_listpids(PROC_ALL_PIDS, 0, ptr::null_mut(), 0) };
            if bytes <= 0 {
                return Err(Error::last_os_error("proc_listpids"));
            }
            Ok(bytes as usize / pid_size)
        },
        |pids: &mut [c_int]| {
            let capacity = c_int::try_from(pids.len() * pid_size).unwrap_or(c_int::MAX);
            // SAFETY: `pids` is valid for `capacity` bytes.
            let bytes = unsafe {
                libc::proc_listpids(PROC_ALL_PIDS, 0, pids.as_mut_ptr().cast::<c_void>(), capacity)
            };
            if bytes <= 0 {
                return Err(Error::last_os_error("proc_listpids"));
            }
            Ok(bytes as usize / pid_size)
        },
    )
}

/// Fetch the `flavor` record of `pid` into a buffer shaped by `layout`.
fn pid_info(pid: i32, flavor: c_int, layout: &StructLayout) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; layout.byte_size()];
    let size = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
    // SAFETY: `buf` is valid for `size` bytes.
    let rc = unsafe { libc::proc_pidinfo(pid, flavor, 0, buf.as_mut_ptr().cast::<c_void>(), size) };
    if rc <= 0 {
        return Err(Error::last_os_error("proc_pidinfo"));
    }
    if (rc as usize) < buf.len() {
        return Err(Error::malformed(
            layout.name(),
            format!("{rc} of {} bytes", buf.len()),
        ));
    }
    Ok(buf)
}

fn pid_path(pid: i32) -> Result<String> {
    let mut buf = vec![0u8; PROC_PIDPATHINFO_MAXSIZE];
    // SAFETY: `buf` is valid for its full length.
    let rc = unsafe {
        libc::proc_pidpath(pid, buf.as_mut_ptr().cast::<c_void>(), buf.len() as u32)
    };
    if rc <= 0 {
        return Err(Error::last_os_error("proc_pidpath"));
    }
    Ok(c_string_to_rust(&buf[..rc as usize]))
}

fn pid_rusage(pid: i32, layout: &StructLayout) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; layout.byte_size()];
    // SAFETY: `buf` is large enough for the requested flavor.
    let rc = unsafe {
        libc::proc_pid_rusage(pid, RUSAGE_INFO_V2, buf.as_mut_ptr().cast::<libc::rusage_info_t>())
    };
    if rc != 0 {
        return Err(Error::last_os_error("proc_pid_rusage"));
    }
    Ok(buf)
}

fn run_state(status: u32) -> ProcessState {
    match status {
        SIDL => ProcessState::New,
        SRUN => ProcessState::Running,
        SSLEEP => ProcessState::Sleeping,
        SSTOP => ProcessState::Stopped,
        SZOMB => ProcessState::Zombie,
        _ => ProcessState::Other,
    }
}

fn read_attributes(pid: i32, version: OsVersion) -> Result<ProcessAttributes> {
    let info = &*PROC_TASK_ALL_INFO;
    let buf = pid_info(pid, PROC_PIDTASKALLINFO, info)?;

    let thread_count = info.read_i32(&buf, "ptinfo.pti_threadnum");
    if thread_count <= 0 {
        return Err(Error::malformed(info.name(), "no threads"));
    }

    let path = pid_path(pid).unwrap_or_default();
    let name = match path.rsplit('/').next() {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => info.read_c_string(&buf, "pbsd.pbi_comm"),
    };

    let uid = info.read_u32(&buf, "pbsd.pbi_uid");
    let gid = info.read_u32(&buf, "pbsd.pbi_gid");
    let page_ins = info.read_i32(&buf, "ptinfo.pti_pageins").max(0) as u64;
    let faults = info.read_i32(&buf, "ptinfo.pti_faults").max(0) as u64;
    let start_time = info.read_u64(&buf, "pbsd.pbi_start_tvsec") * 1000
        + info.read_u64(&buf, "pbsd.pbi_start_tvusec") / 1000;

    let (bytes_read, bytes_written) = layout::rusage_for(version)
        .and_then(|usage| {
            pid_rusage(pid, usage)
                .map(|buf| {
                    (
                        usage.read_u64(&buf, "ri_diskio_bytesread"),
                        usage.read_u64(&buf, "ri_diskio_byteswritten"),
                    )
                })
                .ok()
        })
        .unwrap_or((0, 0));

    let cwd = pid_info(pid, PROC_PIDVNODEPATHINFO, &PROC_VNODE_PATH_INFO)
        .ok()
        .map(|vpi| PROC_VNODE_PATH_INFO.read_c_string(&vpi, "pvi_cdir.vip_path"));

    Ok(ProcessAttributes {
        name,
        path,
        current_working_directory: cwd,
        user: unix::user_name(uid),
        user_id: uid.to_string(),
        group: unix::group_name(gid),
        group_id: gid.to_string(),
        state: run_state(info.read_u32(&buf, "pbsd.pbi_status")),
        parent_process_id: info.read_u32(&buf, "pbsd.pbi_ppid") as i32,
        thread_count: thread_count as u32,
        priority: info.read_i32(&buf, "ptinfo.pti_priority"),
        virtual_size: info.read_u64(&buf, "ptinfo.pti_virtual_size"),
        resident_set_size: info.read_u64(&buf, "ptinfo.pti_resident_size"),
        kernel_time: mach_to_millis(info.read_u64(&buf, "ptinfo.pti_total_system")),
        user_time: mach_to_millis(info.read_u64(&buf, "ptinfo.pti_total_user")),
        start_time,
        up_time: 0,
        open_files: u64::from(info.read_u32(&buf, "pbsd.pbi_nfiles")),
        bitness: if info.read_u32(&buf, "pbsd.pbi_flags") & P_LP64 == 0 {
            32
        } else {
            64
        },
        minor_faults: faults.saturating_sub(page_ins),
        major_faults: page_ins,
        context_switches: info.read_i32(&buf, "ptinfo.pti_csw").max(0) as u64,
        bytes_read,
        bytes_written,
    })
}

/// Reads processes through libproc and sysctl.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSource;

impl ProcessSource for NativeSource {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn list_pids(&self) -> Result<Vec<i32>> {
        list_all_pids()
    }

    fn current_pid(&self) -> i32 {
        // SAFETY: getpid cannot fail.
        unsafe { libc::getpid() }
    }

    fn attributes(&self, pid: i32, version: OsVersion) -> Option<ProcessAttributes> {
        read_attributes(pid, version)
            .map_err(|err| log::trace!("process {pid}: {err}"))
            .ok()
    }

    fn arguments(&self, pid: i32) -> ArgsEnv {
        let argmax = ARGMAX.get();
        if argmax <= 0 {
            return ArgsEnv::default();
        }
        match sysctl_mib(&[CTL_KERN, KERN_PROCARGS2, pid], argmax as usize) {
            Ok(blob) => procargs::parse_procargs2(&blob, pid),
            Err(err) => {
                log::trace!("process {pid}: {err}");
                ArgsEnv::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state() {
        assert_eq!(run_state(SIDL), ProcessState::New);
        assert_eq!(run_state(SRUN), ProcessState::Running);
        assert_eq!(run_state(SZOMB), ProcessState::Zombie);
        assert_eq!(run_state(42), ProcessState::Other);
    }

    #[test]
    fn test_list_pids_contains_self() {
        let pids = NativeSource.list_pids().unwrap();
        assert!(pids.contains(&NativeSource.current_pid()));
    }

    #[test]
    fn test_current_process_attributes() {
        let pid = NativeSource.current_pid();
        let attrs = NativeSource.attributes(pid, OsVersion::detect()).unwrap();
        assert!(attrs.thread_count >= 1);
        assert_eq!(attrs.bitness, 64);
        assert!(attrs.path.ends_with(&attrs.name));
        assert!(attrs.start_time > 0);
        assert!(attrs.current_working_directory.is_some());
    }

    #[test]
    fn test_current_arguments() {
        let args = NativeSource.arguments(NativeSource.current_pid());
        let expected: Vec<String> = std::env::args().collect();
        assert_eq!(args.arguments, expected);
        assert!(!args.environment.is_empty());
    }

    #[test]
    fn test_pid_zero_is_quiet() {
        assert_eq!(NativeSource.arguments(0), ArgsEnv::default());
    }

    #[test]
    fn test_sysctl_is_idempotent() {
        let first = sysctl_int("kern.argmax", 0);
        assert!(first > 0);
        assert_eq!(sysctl_int("kern.argmax", 0), first);
        assert_eq!(
            sysctl_string("kern.ostype", ""),
            sysctl_string("kern.ostype", "")
        );
        assert_eq!(sysctl_string("kern.ostype", ""), "Darwin");
        assert_eq!(sysctl_long("no.such.key", -3), -3);
        assert!(sysctl_long("hw.memsize", 0) > 0);
    }

    #[test]
    fn test_os_release() {
        assert!(OsVersion::detect().major >= 10);
    }
}
