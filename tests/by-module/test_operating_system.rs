// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.
#![cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]

use procview::{filtering, sorting, Config, OperatingSystem, ProcessQuery, ProcessSnapshot};
use std::collections::HashSet;
use std::num::NonZeroUsize;

fn me() -> i32 {
    std::process::id() as i32
}

fn pids(processes: &[ProcessSnapshot]) -> HashSet<i32> {
    processes.iter().map(ProcessSnapshot::pid).collect()
}

#[test]
fn test_listing_contains_current_process() {
    let os = OperatingSystem::new();
    let all = os.processes(&ProcessQuery::new());
    assert!(pids(&all).contains(&me()));
}

#[test]
fn test_listing_holds_only_valid_processes() {
    let os = OperatingSystem::new();
    for process in os.processes(&ProcessQuery::new()) {
        assert!(process.is_valid(), "{process:?}");
        assert!(process.thread_count() >= 1, "{process:?}");
    }
}

#[test]
fn test_listing_has_unique_pids() {
    let os = OperatingSystem::new();
    let all = os.processes(&ProcessQuery::new());
    assert_eq!(pids(&all).len(), all.len());
}

#[test]
fn test_filter_sort_limit() {
    let os = OperatingSystem::new();
    let query = ProcessQuery::new()
        .filter(filtering::BITNESS_64)
        .sort(sorting::NAME_ASC)
        .limit(5);
    let top = os.processes(&query);

    assert!(top.len() <= 5);
    #[cfg(target_pointer_width = "64")]
    assert!(!top.is_empty());
    assert!(top.iter().all(|p| p.bitness() == 64));
    let names: Vec<String> = top.iter().map(|p| p.name().to_lowercase()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn test_sorted_by_pid() {
    let os = OperatingSystem::new();
    let all = os.processes(&ProcessQuery::new().sort(sorting::PID_ASC));
    assert!(all.windows(2).all(|w| w[0].pid() < w[1].pid()));
}

#[test]
fn test_sorted_by_resident_set_size() {
    let os = OperatingSystem::new();
    let all = os.processes(&ProcessQuery::new().sort(sorting::RSS_DESC).limit(10));
    assert!(all
        .windows(2)
        .all(|w| w[0].resident_set_size() >= w[1].resident_set_size()));
}

#[test]
fn test_single_thread_listing() {
    let config = Config {
        threads: NonZeroUsize::MIN,
        ..Config::default()
    };
    let os = OperatingSystem::new().with_config(config);
    let all = os.processes(&ProcessQuery::new().filter(filtering::VALID_PROCESS));
    assert!(pids(&all).contains(&me()));
}

#[test]
fn test_processes_by_pids_deduplicates() {
    let os = OperatingSystem::new();
    let found = os.processes_by_pids([me(), me(), i32::MAX, me()]);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].pid(), me());
}

#[test]
fn test_children_of_parent_include_current_process() {
    let os = OperatingSystem::new();
    let parent = os.current_process().unwrap().parent_process_id();

    let children = os.child_processes(parent, &ProcessQuery::new());
    assert!(pids(&children).contains(&me()));
    assert!(children.iter().all(|p| p.parent_process_id() == parent));

    let descendants = os.descendant_processes(parent, &ProcessQuery::new());
    assert!(pids(&descendants).contains(&me()));
    assert!(descendants.len() >= children.len());
}

#[cfg(target_os = "linux")]
#[test]
fn test_init_is_listed() {
    let os = OperatingSystem::new();
    let init = os.get(1).expect("pid 1 is readable");
    assert_eq!(init.parent_process_id(), 0);
}
