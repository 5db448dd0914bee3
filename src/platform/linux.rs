// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore (procfs) btime osrelease ctxt nonvoluntary majflt minflt starttime vsize
// spell-checker:ignore (procfs) utime stime

//! `/proc` backed process source.

use crate::error::{Error, Result};
use crate::layout::{ELFCLASS32, ELFCLASS64, ELF_IDENT};
use crate::memoize::Memoizer;
use crate::platform::{unix, ProcessSource};
use crate::procargs;
use crate::process::{ArgsEnv, ProcessAttributes, ProcessState};
use crate::version::{OsVersion, Platform};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;
use std::sync::LazyLock;
use walkdir::WalkDir;

// Zero-based indices into `/proc/<pid>/stat` once split by `stat_split`.
const STAT_STATE: usize = 2;
const STAT_PPID: usize = 3;
const STAT_MINFLT: usize = 9;
const STAT_MAJFLT: usize = 11;
const STAT_UTIME: usize = 13;
const STAT_STIME: usize = 14;
const STAT_PRIORITY: usize = 17;
const STAT_NUM_THREADS: usize = 19;
const STAT_STARTTIME: usize = 21;
const STAT_VSIZE: usize = 22;
const STAT_RSS: usize = 23;

/// Boot time in epoch seconds.
static BOOT_TIME: LazyLock<Memoizer<u64>> = LazyLock::new(|| Memoizer::forever(read_boot_time));

fn read_boot_time() -> u64 {
    let btime = fs::read_to_string("/proc/stat").ok().and_then(|stat| {
        stat.lines()
            .find_map(|line| line.strip_prefix("btime"))
            .and_then(|value| value.trim().parse::<u64>().ok())
    });
    btime.unwrap_or_else(|| {
        log::debug!("no btime in /proc/stat, process start times are relative to the epoch");
        0
    })
}

fn clock_ticks() -> u64 {
    rustix::param::clock_ticks_per_second().max(1)
}

fn ticks_to_millis(ticks: u64) -> u64 {
    ticks.saturating_mul(1000) / clock_ticks()
}

fn proc_path(pid: i32, file: &str) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/{file}"))
}

/// Read a kernel parameter such as `kernel.pid_max` from `/proc/sys`.
pub fn read_sysctl(name: &str) -> Result<String> {
    let path = PathBuf::from("/proc/sys").join(name.replace('.', "/"));
    fs::read_to_string(path)
        .map(|value| value.trim_end().to_string())
        .map_err(|err| Error::from_io("sysctl", err))
}

/// String kernel parameter, `default` when it is missing.
pub fn sysctl_string(name: &str, default: &str) -> String {
    read_sysctl(name).unwrap_or_else(|err| {
        log::debug!("sysctl {name}: {err}");
        default.to_string()
    })
}

/// Integer kernel parameter, `default` when it is missing or not a number.
pub fn sysctl_long(name: &str, default: i64) -> i64 {
    read_sysctl(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or_else(|| {
            log::debug!("sysctl {name} unavailable, using {default}");
            default
        })
}

pub fn sysctl_int(name: &str, default: i32) -> i32 {
    i32::try_from(sysctl_long(name, i64::from(default))).unwrap_or(default)
}

/// Kernel release string, e.g. `6.8.0-45-generic`.
pub fn os_release() -> Result<String> {
    read_sysctl("kernel.osrelease")
}

/// Split `/proc/<pid>/stat`, keeping a command name that contains spaces or
/// parentheses as one field.
fn stat_split(stat: &str) -> Vec<String> {
    if let (Some(left), Some(right)) = (stat.find('('), stat.rfind(')')) {
        let mut split_stat = vec![stat[..left].trim().to_string()];
        split_stat.push(stat[left + 1..right].to_string());
        split_stat.extend(
            stat.get(right + 1..)
                .unwrap_or_default()
                .split_whitespace()
                .map(String::from),
        );
        split_stat
    } else {
        stat.split_whitespace().map(String::from).collect()
    }
}

fn stat_field(stat: &[String], index: usize) -> Result<u64> {
    stat.get(index)
        .and_then(|value| value.parse::<u64>().ok())
        .ok_or_else(|| Error::malformed("/proc/<pid>/stat", format!("field {index}")))
}

fn stat_field_i64(stat: &[String], index: usize) -> Result<i64> {
    stat.get(index)
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| Error::malformed("/proc/<pid>/stat", format!("field {index}")))
}

fn parse_status(status: &str) -> HashMap<&str, &str> {
    status
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key, value.trim()))
        .collect()
}

fn status_number(status: &HashMap<&str, &str>, key: &str) -> u64 {
    status
        .get(key)
        .and_then(|value| value.split_whitespace().next())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

/// Id of the process a task belongs to.
fn thread_group(status: &HashMap<&str, &str>) -> Option<i32> {
    status.get("Tgid")?.parse().ok()
}

fn run_state(code: &str) -> ProcessState {
    match code {
        "R" => ProcessState::Running,
        "S" | "I" => ProcessState::Sleeping,
        "D" => ProcessState::Waiting,
        "Z" => ProcessState::Zombie,
        "T" | "t" => ProcessState::Stopped,
        _ => ProcessState::Other,
    }
}

/// `(read_bytes, write_bytes)` from `/proc/<pid>/io`; only readable for
/// processes we may trace.
fn io_counters(pid: i32) -> (u64, u64) {
    let Ok(io) = fs::read_to_string(proc_path(pid, "io")) else {
        return (0, 0);
    };
    let io = parse_status(&io);
    (
        status_number(&io, "read_bytes"),
        status_number(&io, "write_bytes"),
    )
}

/// Address width of the executable image from its ELF class byte.
fn bitness(pid: i32) -> u32 {
    let mut ident = [0u8; 16];
    let read = File::open(proc_path(pid, "exe")).and_then(|mut exe| exe.read_exact(&mut ident));
    if read.is_err() || ident[..4] != *b"\x7fELF" {
        return 0;
    }
    match ELF_IDENT.read_u8(&ident, "ei_class") {
        ELFCLASS32 => 32,
        ELFCLASS64 => 64,
        _ => 0,
    }
}

fn link_target(pid: i32, file: &str) -> Option<String> {
    fs::read_link(proc_path(pid, file))
        .ok()
        .map(|target| target.to_string_lossy().into_owned())
}

fn open_files(pid: i32) -> u64 {
    fs::read_dir(proc_path(pid, "fd")).map_or(0, |dir| dir.flatten().count() as u64)
}

/// Final path component, or the whole string when it has none.
fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn read_attributes(pid: i32) -> Result<ProcessAttributes> {
    let stat = fs::read_to_string(proc_path(pid, "stat"))
        .map_err(|err| Error::from_io("read /proc/<pid>/stat", err))?;
    let stat = stat_split(&stat);

    let thread_count = stat_field(&stat, STAT_NUM_THREADS)?;
    if thread_count == 0 {
        return Err(Error::malformed("/proc/<pid>/stat", "no threads"));
    }

    let status = fs::read_to_string(proc_path(pid, "status")).unwrap_or_default();
    let status = parse_status(&status);
    // Every thread has its own `/proc/<tid>` entry.
    if let Some(tgid) = thread_group(&status).filter(|&tgid| tgid != pid) {
        return Err(Error::malformed(
            "/proc/<pid>/status",
            format!("{pid} is a thread of process {tgid}"),
        ));
    }
    let uid = status_number(&status, "Uid");
    let gid = status_number(&status, "Gid");

    let short_name = stat.get(1).cloned().unwrap_or_default();
    let path = link_target(pid, "exe")
        .map(|exe| exe.trim_end_matches(" (deleted)").to_string())
        .unwrap_or_default();
    let name = match base_name(&path) {
        "" => short_name,
        base => base.to_string(),
    };

    let page_size = rustix::param::page_size() as u64;
    let start_ticks = stat_field(&stat, STAT_STARTTIME)?;
    let (bytes_read, bytes_written) = io_counters(pid);

    Ok(ProcessAttributes {
        name,
        path,
        current_working_directory: link_target(pid, "cwd"),
        user: u32::try_from(uid).ok().and_then(unix::user_name),
        user_id: uid.to_string(),
        group: u32::try_from(gid).ok().and_then(unix::group_name),
        group_id: gid.to_string(),
        state: run_state(stat.get(STAT_STATE).map_or("", String::as_str)),
        parent_process_id: stat_field_i64(&stat, STAT_PPID)? as i32,
        thread_count: u32::try_from(thread_count).unwrap_or(u32::MAX),
        priority: stat_field_i64(&stat, STAT_PRIORITY)? as i32,
        virtual_size: stat_field(&stat, STAT_VSIZE)?,
        resident_set_size: stat_field(&stat, STAT_RSS)?.saturating_mul(page_size),
        kernel_time: ticks_to_millis(stat_field(&stat, STAT_STIME)?),
        user_time: ticks_to_millis(stat_field(&stat, STAT_UTIME)?),
        start_time: BOOT_TIME.get() * 1000 + ticks_to_millis(start_ticks),
        up_time: 0,
        open_files: open_files(pid),
        bitness: bitness(pid),
        minor_faults: stat_field(&stat, STAT_MINFLT)?,
        major_faults: stat_field(&stat, STAT_MAJFLT)?,
        context_switches: status_number(&status, "voluntary_ctxt_switches")
            + status_number(&status, "nonvoluntary_ctxt_switches"),
        bytes_read,
        bytes_written,
    })
}

/// Reads processes from the `/proc` filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSource;

impl ProcessSource for NativeSource {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn list_pids(&self) -> Result<Vec<i32>> {
        let entries = WalkDir::new("/proc/")
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return Err(Error::Unsupported("/proc without process directories"));
        }
        Ok(entries)
    }

    fn current_pid(&self) -> i32 {
        rustix::process::getpid().as_raw_nonzero().get()
    }

    fn attributes(&self, pid: i32, _version: OsVersion) -> Option<ProcessAttributes> {
        read_attributes(pid)
            .map_err(|err| log::trace!("process {pid}: {err}"))
            .ok()
    }

    fn arguments(&self, pid: i32) -> ArgsEnv {
        let read = |file| fs::read(proc_path(pid, file)).unwrap_or_default();
        ArgsEnv {
            arguments: procargs::parse_nul_separated(&read("cmdline")),
            environment: procargs::parse_environment(procargs::parse_nul_separated(
                &read("environ"),
            )),
        }
    }
}
