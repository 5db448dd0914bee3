// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use procview::{OperatingSystem, Platform, ProcessState};

// ============================================================================
// Current process
// ============================================================================

#[test]
fn test_platform_matches_target() {
    let os = OperatingSystem::new();
    assert_eq!(os.platform(), Platform::current());
}

#[test]
fn test_current_pid() {
    let os = OperatingSystem::new();
    assert_eq!(os.current_pid(), std::process::id() as i32);
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
mod native {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::{SystemTime, UNIX_EPOCH};
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    fn oracle(pid: i32) -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid as u32)]),
            true,
            ProcessRefreshKind::everything(),
        );
        system
    }

    #[test]
    fn test_current_process_is_valid() {
        let os = OperatingSystem::new();
        let me = os.current_process().expect("current process is readable");
        assert!(me.is_valid());
        assert_eq!(me.pid(), std::process::id() as i32);
        assert!(me.thread_count() >= 1);
        assert!(me.resident_set_size() > 0);
        assert!(me.virtual_size() >= me.resident_set_size());
        assert!(!me.name().is_empty());
        assert_ne!(me.state(), ProcessState::Invalid);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(me.bitness(), 64);
    }

    #[test]
    fn test_current_process_matches_sysinfo() {
        let os = OperatingSystem::new();
        let me = os.current_process().unwrap();
        let system = oracle(me.pid());
        let expected = system
            .process(Pid::from_u32(me.pid() as u32))
            .expect("sysinfo sees the current process");

        assert_eq!(
            Some(me.parent_process_id()),
            expected.parent().map(|pid| pid.as_u32() as i32)
        );
        let start_secs = me.start_time() / 1000;
        assert!(
            start_secs.abs_diff(expected.start_time()) <= 2,
            "start time {start_secs} vs {}",
            expected.start_time()
        );
        if let Some(exe) = expected.exe() {
            assert_eq!(Path::new(me.path()).file_name(), exe.file_name());
        }
    }

    #[test]
    fn test_path_is_current_exe() {
        let os = OperatingSystem::new();
        let me = os.current_process().unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(Path::new(me.path()).file_name(), exe.file_name());
    }

    #[test]
    fn test_up_time_tracks_start_time() {
        let os = OperatingSystem::new();
        let before = now_millis();
        let me = os.current_process().unwrap();
        let after = now_millis();

        assert!(me.start_time() > 0);
        assert!(me.start_time() <= after);
        let end = me.start_time() + me.up_time();
        assert!(
            end + 1000 >= before && end <= after + 1000,
            "start {} + up {} outside [{before}, {after}]",
            me.start_time(),
            me.up_time()
        );
    }

    #[test]
    fn test_cpu_load_cumulative_is_a_ratio_of_threads() {
        let os = OperatingSystem::new();
        let me = os.current_process().unwrap();
        let load = me.cpu_load_cumulative();
        assert!(load >= 0.0);
        assert!(load <= f64::from(me.thread_count().max(1)) * 1.5, "load {load}");
    }

    #[test]
    fn test_refresh_keeps_identity() {
        let os = OperatingSystem::new();
        let mut me = os.current_process().unwrap();
        let start = me.start_time();
        assert!(me.refresh());
        assert_eq!(me.start_time(), start);
        assert_eq!(me.pid(), std::process::id() as i32);
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_current_arguments() {
        let os = OperatingSystem::new();
        let me = os.current_process().unwrap();
        let expected: Vec<String> = std::env::args().collect();
        assert_eq!(me.arguments(), expected.as_slice());
        assert_eq!(me.command_line(), expected.join(" "));
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_current_environment() {
        let os = OperatingSystem::new();
        let me = os.current_process().unwrap();
        let environment = me.environment();
        assert!(!environment.is_empty());
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(environment.get("PATH"), Some(path.as_str()));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_current_owner() {
        let os = OperatingSystem::new();
        let me = os.current_process().unwrap();
        let uid = unsafe { libc::getuid() };
        assert_eq!(me.user_id(), uid.to_string());
        if uid == 0 {
            assert_eq!(me.user(), Some("root"));
        }
        assert!(!me.group_id().is_empty());
    }
}

// ============================================================================
// Absent processes
// ============================================================================

#[test]
fn test_missing_pid_is_absent() {
    let os = OperatingSystem::new();
    assert!(os.get(i32::MAX).is_none());
    assert!(os.get(-1).is_none());
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
#[test]
fn test_lookup_follows_child_lifetime() {
    use procview::ProcessQuery;
    use std::process::{Command, Stdio};

    let mut command = if cfg!(windows) {
        let mut ping = Command::new("ping");
        ping.args(["-n", "30", "127.0.0.1"]);
        ping
    } else {
        let mut sleep = Command::new("sleep");
        sleep.arg("30");
        sleep
    };
    let mut child = command.stdout(Stdio::null()).spawn().unwrap();
    let pid = child.id() as i32;

    let os = OperatingSystem::new();
    let me = std::process::id() as i32;
    let snapshot = os.get(pid).expect("child is visible right after spawn");
    assert_eq!(snapshot.parent_process_id(), me);
    let children = os.child_processes(me, &ProcessQuery::new());
    assert!(children.iter().any(|p| p.pid() == pid));

    child.kill().unwrap();
    child.wait().unwrap();
    drop(child);
    assert!(os.get(pid).is_none());
    assert!(os.processes_by_pids([pid]).is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn test_thread_id_is_not_a_process() {
    use std::sync::mpsc;
    use std::thread;

    let (tid_tx, tid_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let worker = thread::spawn(move || {
        let tid = unsafe { libc::syscall(libc::SYS_gettid) } as i32;
        tid_tx.send(tid).unwrap();
        done_rx.recv().ok();
    });
    let tid = tid_rx.recv().unwrap();

    let os = OperatingSystem::new();
    assert_ne!(tid, os.current_pid());
    assert!(os.get(tid).is_none());
    assert!(os.processes_by_pids([tid]).is_empty());

    done_tx.send(()).unwrap();
    worker.join().unwrap();
}
