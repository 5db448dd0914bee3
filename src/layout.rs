// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (structs) bsdinfo taskinfo taskallinfo vnodepathinfo vinfo rusage wkups
// spell-checker:ignore (structs) abstime diskio

//! Byte layouts of the native records returned by the kernel.
//!
//! Every record is mirrored by a `#[repr(C)]` struct so that offsets, sizes
//! and padding come from the compiler instead of hand-counted constants. The
//! mirrors are compiled on every target, which lets the decoding logic be
//! tested anywhere; only the gateway that fills the buffers is
//! platform-specific.
//!
//! Field paths name nested members with dots, e.g. `pbsd.pbi_comm`. Looking up
//! a path that the layout does not declare is a programming error and panics.

use std::ffi::CStr;
use std::mem::{offset_of, size_of};
use std::sync::LazyLock;

/// Position and width of one named field inside a native record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

/// Shape of a fixed-size native record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    name: &'static str,
    size: usize,
    fields: Vec<FieldLayout>,
}

fn field_size<S, F>(_: fn(&S) -> &F) -> usize {
    size_of::<F>()
}

/// Build a [`StructLayout`] for a `#[repr(C)]` mirror struct.
macro_rules! struct_layout {
    ($ty:ty, [$($field:ident),+ $(,)?]) => {
        StructLayout::new(
            stringify!($ty),
            size_of::<$ty>(),
            vec![
                $(FieldLayout {
                    name: stringify!($field).to_string(),
                    offset: offset_of!($ty, $field),
                    size: field_size::<$ty, _>(|s: &$ty| &s.$field),
                }),+
            ],
        )
    };
}

impl StructLayout {
    fn new(name: &'static str, size: usize, fields: Vec<FieldLayout>) -> Self {
        Self { name, size, fields }
    }

    /// Declare the fields of `inner`, placed at `offset`, under `prefix.`.
    fn embed(mut self, prefix: &str, offset: usize, inner: &StructLayout) -> Self {
        self.fields.extend(inner.fields.iter().map(|field| FieldLayout {
            name: format!("{prefix}.{}", field.name),
            offset: offset + field.offset,
            size: field.size,
        }));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size of the whole record in bytes, padding included.
    pub fn byte_size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    /// # Panics
    ///
    /// If `path` is not a field of this record.
    pub fn field(&self, path: &str) -> &FieldLayout {
        self.fields
            .iter()
            .find(|field| field.name == path)
            .unwrap_or_else(|| panic!("{} has no field `{}`", self.name, path))
    }

    /// Byte offset of `path` from the start of the record.
    pub fn offset(&self, path: &str) -> usize {
        self.field(path).offset
    }

    /// The raw bytes of `path` inside `buf`.
    pub fn bytes<'a>(&self, buf: &'a [u8], path: &str) -> &'a [u8] {
        assert!(
            buf.len() >= self.size,
            "{} needs {} bytes, buffer holds {}",
            self.name,
            self.size,
            buf.len()
        );
        let field = self.field(path);
        &buf[field.offset..field.offset + field.size]
    }

    fn array<const N: usize>(&self, buf: &[u8], path: &str) -> [u8; N] {
        let bytes = self.bytes(buf, path);
        assert_eq!(bytes.len(), N, "{}.{} is {} bytes wide", self.name, path, bytes.len());
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        out
    }

    pub fn read_u8(&self, buf: &[u8], path: &str) -> u8 {
        u8::from_ne_bytes(self.array(buf, path))
    }

    pub fn read_u16(&self, buf: &[u8], path: &str) -> u16 {
        u16::from_ne_bytes(self.array(buf, path))
    }

    pub fn read_u32(&self, buf: &[u8], path: &str) -> u32 {
        u32::from_ne_bytes(self.array(buf, path))
    }

    pub fn read_i32(&self, buf: &[u8], path: &str) -> i32 {
        i32::from_ne_bytes(self.array(buf, path))
    }

    pub fn read_u64(&self, buf: &[u8], path: &str) -> u64 {
        u64::from_ne_bytes(self.array(buf, path))
    }

    /// Pointer-sized field, returned as an address.
    pub fn read_usize(&self, buf: &[u8], path: &str) -> usize {
        usize::from_ne_bytes(self.array(buf, path))
    }

    /// NUL-terminated string stored inline in a fixed-width `char[]` field.
    ///
    /// A field without a terminator is read to its full width.
    pub fn read_c_string(&self, buf: &[u8], path: &str) -> String {
        let bytes = self.bytes(buf, path);
        match CStr::from_bytes_until_nul(bytes) {
            Ok(s) => s.to_string_lossy().into_owned(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// NUL-terminated UTF-16 string stored inline in a fixed-width `WCHAR[]` field.
    pub fn read_wide_string(&self, buf: &[u8], path: &str) -> String {
        let units: Vec<u16> = self
            .bytes(buf, path)
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }
}

// ============================================================================
// Darwin libproc records (<sys/proc_info.h>)
// ============================================================================

pub const MAXCOMLEN: usize = 16;
pub const MAXPATHLEN: usize = 1024;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProcBsdInfo {
    pub pbi_flags: u32,
    pub pbi_status: u32,
    pub pbi_xstatus: u32,
    pub pbi_pid: u32,
    pub pbi_ppid: u32,
    pub pbi_uid: u32,
    pub pbi_gid: u32,
    pub pbi_ruid: u32,
    pub pbi_rgid: u32,
    pub pbi_svuid: u32,
    pub pbi_svgid: u32,
    pub rfu_1: u32,
    pub pbi_comm: [u8; MAXCOMLEN],
    pub pbi_name: [u8; 2 * MAXCOMLEN],
    pub pbi_nfiles: u32,
    pub pbi_pgid: u32,
    pub pbi_pjobc: u32,
    pub e_tdev: u32,
    pub e_tpgid: u32,
    pub pbi_nice: i32,
    pub pbi_start_tvsec: u64,
    pub pbi_start_tvusec: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProcTaskInfo {
    pub pti_virtual_size: u64,
    pub pti_resident_size: u64,
    pub pti_total_user: u64,
    pub pti_total_system: u64,
    pub pti_threads_user: u64,
    pub pti_threads_system: u64,
    pub pti_policy: i32,
    pub pti_faults: i32,
    pub pti_pageins: i32,
    pub pti_cow_faults: i32,
    pub pti_messages_sent: i32,
    pub pti_messages_received: i32,
    pub pti_syscalls_mach: i32,
    pub pti_syscalls_unix: i32,
    pub pti_csw: i32,
    pub pti_threadnum: i32,
    pub pti_numrunning: i32,
    pub pti_priority: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProcTaskAllInfo {
    pub pbsd: ProcBsdInfo,
    pub ptinfo: ProcTaskInfo,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RusageInfoV2 {
    pub ri_uuid: [u8; 16],
    pub ri_user_time: u64,
    pub ri_system_time: u64,
    pub ri_pkg_idle_wkups: u64,
    pub ri_interrupt_wkups: u64,
    pub ri_pageins: u64,
    pub ri_wired_size: u64,
    pub ri_resident_size: u64,
    pub ri_phys_footprint: u64,
    pub ri_proc_start_abstime: u64,
    pub ri_proc_exit_abstime: u64,
    pub ri_child_user_time: u64,
    pub ri_child_system_time: u64,
    pub ri_child_pkg_idle_wkups: u64,
    pub ri_child_interrupt_wkups: u64,
    pub ri_child_pageins: u64,
    pub ri_child_elapsed_abstime: u64,
    pub ri_diskio_bytesread: u64,
    pub ri_diskio_byteswritten: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VinfoStat {
    pub vst_dev: u32,
    pub vst_mode: u16,
    pub vst_nlink: u16,
    pub vst_ino: u64,
    pub vst_uid: u32,
    pub vst_gid: u32,
    pub vst_atime: i64,
    pub vst_atimensec: i64,
    pub vst_mtime: i64,
    pub vst_mtimensec: i64,
    pub vst_ctime: i64,
    pub vst_ctimensec: i64,
    pub vst_birthtime: i64,
    pub vst_birthtimensec: i64,
    pub vst_size: i64,
    pub vst_blocks: i64,
    pub vst_blksize: i32,
    pub vst_flags: u32,
    pub vst_gen: u32,
    pub vst_rdev: u32,
    pub vst_qspare: [i64; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VnodeInfo {
    pub vi_stat: VinfoStat,
    pub vi_type: i32,
    pub vi_pad: i32,
    pub vi_fsid: [i32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VnodeInfoPath {
    pub vip_vi: VnodeInfo,
    pub vip_path: [u8; MAXPATHLEN],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProcVnodePathInfo {
    pub pvi_cdir: VnodeInfoPath,
    pub pvi_rdir: VnodeInfoPath,
}

// ============================================================================
// POSIX user database records (<pwd.h>, <grp.h>)
// ============================================================================

/// `struct passwd` as laid out by Darwin's libc.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DarwinPasswd {
    pub pw_name: usize,
    pub pw_passwd: usize,
    pub pw_uid: u32,
    pub pw_gid: u32,
    pub pw_change: i64,
    pub pw_class: usize,
    pub pw_gecos: usize,
    pub pw_dir: usize,
    pub pw_shell: usize,
    pub pw_expire: i64,
}

/// `struct passwd` as laid out by glibc and musl.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GnuPasswd {
    pub pw_name: usize,
    pub pw_passwd: usize,
    pub pw_uid: u32,
    pub pw_gid: u32,
    pub pw_gecos: usize,
    pub pw_dir: usize,
    pub pw_shell: usize,
}

/// `struct group`, identical on Darwin and glibc.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Group {
    pub gr_name: usize,
    pub gr_passwd: usize,
    pub gr_gid: u32,
    pub gr_mem: usize,
}

// ============================================================================
// Windows records
// ============================================================================

pub const MAX_PATH: usize = 260;

/// `PROCESSENTRY32W` from `<tlhelp32.h>`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)]
pub struct ProcessEntry32W {
    pub dwSize: u32,
    pub cntUsage: u32,
    pub th32ProcessID: u32,
    pub th32DefaultHeapID: usize,
    pub th32ModuleID: u32,
    pub cntThreads: u32,
    pub th32ParentProcessID: u32,
    pub pcPriClassBase: i32,
    pub dwFlags: u32,
    pub szExeFile: [u16; MAX_PATH],
}

/// `UNICODE_STRING` header returned ahead of the command line buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)]
pub struct UnicodeString {
    pub Length: u16,
    pub MaximumLength: u16,
    pub Buffer: usize,
}

/// `VM_COUNTERS` answered by `NtQueryInformationProcess(ProcessVmCounters)`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(non_snake_case)]
pub struct VmCounters {
    pub PeakVirtualSize: usize,
    pub VirtualSize: usize,
    pub PageFaultCount: u32,
    pub PeakWorkingSetSize: usize,
    pub WorkingSetSize: usize,
    pub QuotaPeakPagedPoolUsage: usize,
    pub QuotaPagedPoolUsage: usize,
    pub QuotaPeakNonPagedPoolUsage: usize,
    pub QuotaNonPagedPoolUsage: usize,
    pub PagefileUsage: usize,
    pub PeakPagefileUsage: usize,
}

// ============================================================================
// ELF identification (the first bytes of any ELF image)
// ============================================================================

pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ElfIdent {
    pub ei_mag: [u8; 4],
    pub ei_class: u8,
    pub ei_data: u8,
    pub ei_version: u8,
    pub ei_osabi: u8,
    pub ei_abiversion: u8,
    pub ei_pad: [u8; 7],
}

// ============================================================================
// Static layout tables
// ============================================================================

pub static PROC_BSD_INFO: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        ProcBsdInfo,
        [
            pbi_flags, pbi_status, pbi_xstatus, pbi_pid, pbi_ppid, pbi_uid, pbi_gid, pbi_ruid,
            pbi_rgid, pbi_svuid, pbi_svgid, rfu_1, pbi_comm, pbi_name, pbi_nfiles, pbi_pgid,
            pbi_pjobc, e_tdev, e_tpgid, pbi_nice, pbi_start_tvsec, pbi_start_tvusec,
        ]
    )
});

pub static PROC_TASK_INFO: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        ProcTaskInfo,
        [
            pti_virtual_size, pti_resident_size, pti_total_user, pti_total_system,
            pti_threads_user, pti_threads_system, pti_policy, pti_faults, pti_pageins,
            pti_cow_faults, pti_messages_sent, pti_messages_received, pti_syscalls_mach,
            pti_syscalls_unix, pti_csw, pti_threadnum, pti_numrunning, pti_priority,
        ]
    )
});

/// `proc_taskallinfo`, the superset record fetched with `PROC_PIDTASKALLINFO`.
pub static PROC_TASK_ALL_INFO: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(ProcTaskAllInfo, [pbsd, ptinfo])
        .embed("pbsd", offset_of!(ProcTaskAllInfo, pbsd), &PROC_BSD_INFO)
        .embed("ptinfo", offset_of!(ProcTaskAllInfo, ptinfo), &PROC_TASK_INFO)
});

pub static RUSAGE_INFO_V2: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        RusageInfoV2,
        [
            ri_uuid, ri_user_time, ri_system_time, ri_pkg_idle_wkups, ri_interrupt_wkups,
            ri_pageins, ri_wired_size, ri_resident_size, ri_phys_footprint,
            ri_proc_start_abstime, ri_proc_exit_abstime, ri_child_user_time,
            ri_child_system_time, ri_child_pkg_idle_wkups, ri_child_interrupt_wkups,
            ri_child_pageins, ri_child_elapsed_abstime, ri_diskio_bytesread,
            ri_diskio_byteswritten,
        ]
    )
});

static VINFO_STAT: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        VinfoStat,
        [
            vst_dev, vst_mode, vst_nlink, vst_ino, vst_uid, vst_gid, vst_atime, vst_atimensec,
            vst_mtime, vst_mtimensec, vst_ctime, vst_ctimensec, vst_birthtime,
            vst_birthtimensec, vst_size, vst_blocks, vst_blksize, vst_flags, vst_gen, vst_rdev,
            vst_qspare,
        ]
    )
});

static VNODE_INFO_PATH: LazyLock<StructLayout> = LazyLock::new(|| {
    let vnode_info = struct_layout!(VnodeInfo, [vi_stat, vi_type, vi_pad, vi_fsid]).embed(
        "vi_stat",
        offset_of!(VnodeInfo, vi_stat),
        &VINFO_STAT,
    );
    struct_layout!(VnodeInfoPath, [vip_vi, vip_path]).embed(
        "vip_vi",
        offset_of!(VnodeInfoPath, vip_vi),
        &vnode_info,
    )
});

/// `proc_vnodepathinfo`, fetched with `PROC_PIDVNODEPATHINFO`.
pub static PROC_VNODE_PATH_INFO: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(ProcVnodePathInfo, [pvi_cdir, pvi_rdir])
        .embed(
            "pvi_cdir",
            offset_of!(ProcVnodePathInfo, pvi_cdir),
            &VNODE_INFO_PATH,
        )
        .embed(
            "pvi_rdir",
            offset_of!(ProcVnodePathInfo, pvi_rdir),
            &VNODE_INFO_PATH,
        )
});

pub static DARWIN_PASSWD: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        DarwinPasswd,
        [
            pw_name, pw_passwd, pw_uid, pw_gid, pw_change, pw_class, pw_gecos, pw_dir, pw_shell,
            pw_expire,
        ]
    )
});

pub static GNU_PASSWD: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        GnuPasswd,
        [pw_name, pw_passwd, pw_uid, pw_gid, pw_gecos, pw_dir, pw_shell]
    )
});

pub static GROUP: LazyLock<StructLayout> =
    LazyLock::new(|| struct_layout!(Group, [gr_name, gr_passwd, gr_gid, gr_mem]));

/// The `struct passwd` variant of the build target.
pub fn passwd() -> &'static StructLayout {
    if cfg!(target_vendor = "apple") {
        &DARWIN_PASSWD
    } else {
        &GNU_PASSWD
    }
}

pub static PROCESS_ENTRY_32W: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        ProcessEntry32W,
        [
            dwSize, cntUsage, th32ProcessID, th32DefaultHeapID, th32ModuleID, cntThreads,
            th32ParentProcessID, pcPriClassBase, dwFlags, szExeFile,
        ]
    )
});

pub static UNICODE_STRING: LazyLock<StructLayout> =
    LazyLock::new(|| struct_layout!(UnicodeString, [Length, MaximumLength, Buffer]));

pub static VM_COUNTERS: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        VmCounters,
        [
            PeakVirtualSize, VirtualSize, PageFaultCount, PeakWorkingSetSize, WorkingSetSize,
            QuotaPeakPagedPoolUsage, QuotaPagedPoolUsage, QuotaPeakNonPagedPoolUsage,
            QuotaNonPagedPoolUsage, PagefileUsage, PeakPagefileUsage,
        ]
    )
});

pub static ELF_IDENT: LazyLock<StructLayout> = LazyLock::new(|| {
    struct_layout!(
        ElfIdent,
        [ei_mag, ei_class, ei_data, ei_version, ei_osabi, ei_abiversion, ei_pad]
    )
});

/// Resource usage record to request for `version`, if the kernel has one.
///
/// `rusage_info_v2` carries the disk I/O counters and first shipped with
/// OS X 10.9.
pub fn rusage_for(version: crate::version::OsVersion) -> Option<&'static StructLayout> {
    if version.at_least(10, 9) {
        Some(&RUSAGE_INFO_V2)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::OsVersion;
    use pretty_assertions::assert_eq;

    fn all_layouts() -> Vec<&'static StructLayout> {
        vec![
            &PROC_BSD_INFO,
            &PROC_TASK_INFO,
            &PROC_TASK_ALL_INFO,
            &RUSAGE_INFO_V2,
            &PROC_VNODE_PATH_INFO,
            &DARWIN_PASSWD,
            &GNU_PASSWD,
            &GROUP,
            &PROCESS_ENTRY_32W,
            &UNICODE_STRING,
            &VM_COUNTERS,
            &ELF_IDENT,
        ]
    }

    #[test]
    fn test_darwin_record_sizes() {
        assert_eq!(PROC_BSD_INFO.byte_size(), 136);
        assert_eq!(PROC_TASK_INFO.byte_size(), 96);
        assert_eq!(PROC_TASK_ALL_INFO.byte_size(), 232);
        assert_eq!(RUSAGE_INFO_V2.byte_size(), 160);
        assert_eq!(PROC_VNODE_PATH_INFO.byte_size(), 2352);
    }

    #[test]
    fn test_nested_offsets() {
        assert_eq!(PROC_TASK_ALL_INFO.offset("pbsd.pbi_comm"), 48);
        assert_eq!(PROC_TASK_ALL_INFO.offset("pbsd.pbi_start_tvsec"), 120);
        assert_eq!(PROC_TASK_ALL_INFO.offset("ptinfo"), 136);
        assert_eq!(PROC_TASK_ALL_INFO.offset("ptinfo.pti_threadnum"), 136 + 84);
        assert_eq!(PROC_VNODE_PATH_INFO.offset("pvi_cdir.vip_path"), 152);
        assert_eq!(PROC_VNODE_PATH_INFO.offset("pvi_rdir.vip_path"), 1176 + 152);
        assert_eq!(
            PROC_VNODE_PATH_INFO.offset("pvi_cdir.vip_vi.vi_stat.vst_qspare"),
            120
        );
    }

    #[test]
    fn test_rusage_disk_counters() {
        assert_eq!(RUSAGE_INFO_V2.offset("ri_diskio_bytesread"), 144);
        assert_eq!(RUSAGE_INFO_V2.offset("ri_diskio_byteswritten"), 152);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_windows_record_sizes() {
        assert_eq!(PROCESS_ENTRY_32W.byte_size(), 568);
        assert_eq!(PROCESS_ENTRY_32W.offset("szExeFile"), 44);
        assert_eq!(UNICODE_STRING.offset("Buffer"), 8);
        assert_eq!(VM_COUNTERS.byte_size(), 88);
        assert_eq!(VM_COUNTERS.offset("VirtualSize"), 8);
        assert_eq!(VM_COUNTERS.offset("PageFaultCount"), 16);
        assert_eq!(VM_COUNTERS.offset("WorkingSetSize"), 32);
        assert_eq!(VM_COUNTERS.offset("PagefileUsage"), 72);
    }

    #[test]
    fn test_fields_lie_inside_record() {
        for layout in all_layouts() {
            for field in layout.fields() {
                assert!(
                    field.offset + field.size <= layout.byte_size(),
                    "{}.{} overflows the record",
                    layout.name(),
                    field.name
                );
            }
        }
    }

    #[test]
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn test_gnu_passwd_matches_libc() {
        assert_eq!(GNU_PASSWD.byte_size(), size_of::<libc::passwd>());
        assert_eq!(GNU_PASSWD.offset("pw_name"), offset_of!(libc::passwd, pw_name));
        assert_eq!(GNU_PASSWD.offset("pw_uid"), offset_of!(libc::passwd, pw_uid));
        assert_eq!(GNU_PASSWD.offset("pw_shell"), offset_of!(libc::passwd, pw_shell));
        assert_eq!(GROUP.byte_size(), size_of::<libc::group>());
        assert_eq!(GROUP.offset("gr_name"), offset_of!(libc::group, gr_name));
        assert_eq!(GROUP.offset("gr_mem"), offset_of!(libc::group, gr_mem));
    }

    #[test]
    #[cfg(target_vendor = "apple")]
    fn test_darwin_passwd_matches_libc() {
        assert_eq!(DARWIN_PASSWD.byte_size(), size_of::<libc::passwd>());
        assert_eq!(DARWIN_PASSWD.offset("pw_expire"), offset_of!(libc::passwd, pw_expire));
    }

    #[test]
    fn test_read_typed_fields() {
        let mut buf = vec![0u8; PROC_TASK_ALL_INFO.byte_size()];
        let put = |buf: &mut [u8], path: &str, bytes: &[u8]| {
            let offset = PROC_TASK_ALL_INFO.offset(path);
            buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        };
        put(&mut buf, "pbsd.pbi_ppid", &42u32.to_ne_bytes());
        put(&mut buf, "ptinfo.pti_resident_size", &(8u64 << 30).to_ne_bytes());
        put(&mut buf, "ptinfo.pti_priority", &(-4i32).to_ne_bytes());
        put(&mut buf, "pbsd.pbi_comm", b"launchd\0");

        assert_eq!(PROC_TASK_ALL_INFO.read_u32(&buf, "pbsd.pbi_ppid"), 42);
        assert_eq!(
            PROC_TASK_ALL_INFO.read_u64(&buf, "ptinfo.pti_resident_size"),
            8 << 30
        );
        assert_eq!(PROC_TASK_ALL_INFO.read_i32(&buf, "ptinfo.pti_priority"), -4);
        assert_eq!(
            PROC_TASK_ALL_INFO.read_c_string(&buf, "pbsd.pbi_comm"),
            "launchd"
        );
    }

    #[test]
    fn test_read_unterminated_c_string() {
        let mut buf = vec![0u8; PROC_BSD_INFO.byte_size()];
        let offset = PROC_BSD_INFO.offset("pbi_comm");
        buf[offset..offset + MAXCOMLEN].copy_from_slice(b"0123456789abcdef");
        assert_eq!(
            PROC_BSD_INFO.read_c_string(&buf, "pbi_comm"),
            "0123456789abcdef"
        );
    }

    #[test]
    fn test_read_wide_string() {
        let mut buf = vec![0u8; PROCESS_ENTRY_32W.byte_size()];
        let offset = PROCESS_ENTRY_32W.offset("szExeFile");
        for (i, unit) in "svchost.exe".encode_utf16().enumerate() {
            buf[offset + 2 * i..offset + 2 * i + 2].copy_from_slice(&unit.to_ne_bytes());
        }
        assert_eq!(
            PROCESS_ENTRY_32W.read_wide_string(&buf, "szExeFile"),
            "svchost.exe"
        );
    }

    #[test]
    #[should_panic(expected = "has no field `pbsd.pbi_bogus`")]
    fn test_unknown_field_panics() {
        PROC_TASK_ALL_INFO.offset("pbsd.pbi_bogus");
    }

    #[test]
    #[should_panic(expected = "needs 160 bytes")]
    fn test_short_buffer_panics() {
        RUSAGE_INFO_V2.read_u64(&[0u8; 16], "ri_user_time");
    }

    #[test]
    fn test_rusage_gated_by_version() {
        assert!(rusage_for(OsVersion::new(10, 8)).is_none());
        assert_eq!(
            rusage_for(OsVersion::new(10, 9)).map(StructLayout::byte_size),
            Some(160)
        );
        assert!(rusage_for(OsVersion::new(14, 0)).is_some());
    }

    #[test]
    fn test_elf_class_offset() {
        assert_eq!(ELF_IDENT.byte_size(), 16);
        assert_eq!(ELF_IDENT.offset("ei_class"), 4);
        let ident = [0x7f, b'E', b'L', b'F', ELFCLASS64, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(ELF_IDENT.read_u8(&ident, "ei_class"), ELFCLASS64);
    }
}
