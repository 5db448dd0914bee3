// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! The process directory: one entry point for single lookups and queries.

use crate::config::Config;
use crate::platform::{NativeSource, ProcessSource};
use crate::process::ProcessSnapshot;
use crate::version::{OsVersion, Platform};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread;

pub type Filter = fn(&ProcessSnapshot) -> bool;
pub type Sorting = fn(&ProcessSnapshot, &ProcessSnapshot) -> Ordering;

/// Reusable predicates for [`ProcessQuery::filter`].
pub mod filtering {
    use super::Filter;
    use crate::process::ProcessState;

    pub const ALL_PROCESSES: Filter = |_| true;
    pub const VALID_PROCESS: Filter = |p| p.state() != ProcessState::Invalid;
    /// Processes that are their own parent.
    pub const NO_PARENT: Filter = |p| p.parent_process_id() == p.pid();
    pub const BITNESS_64: Filter = |p| p.bitness() == 64;
    pub const BITNESS_32: Filter = |p| p.bitness() == 32;
}

/// Reusable orderings for [`ProcessQuery::sort`].
pub mod sorting {
    use super::Sorting;
    use std::cmp::Ordering;

    pub const NO_SORTING: Sorting = |_, _| Ordering::Equal;
    pub const CPU_DESC: Sorting =
        |a, b| b.cpu_load_cumulative().total_cmp(&a.cpu_load_cumulative());
    pub const RSS_DESC: Sorting = |a, b| b.resident_set_size().cmp(&a.resident_set_size());
    pub const UPTIME_ASC: Sorting = |a, b| a.up_time().cmp(&b.up_time());
    pub const UPTIME_DESC: Sorting = |a, b| b.up_time().cmp(&a.up_time());
    pub const PID_ASC: Sorting = |a, b| a.pid().cmp(&b.pid());
    pub const PARENTPID_ASC: Sorting = |a, b| a.parent_process_id().cmp(&b.parent_process_id());
    /// Case-insensitive.
    pub const NAME_ASC: Sorting = |a, b| {
        let lower = |name: &str| name.chars().flat_map(char::to_lowercase).collect::<Vec<_>>();
        lower(a.name()).cmp(&lower(b.name()))
    };
}

type Predicate = Box<dyn Fn(&ProcessSnapshot) -> bool + Send + Sync>;
type Comparator = Box<dyn Fn(&ProcessSnapshot, &ProcessSnapshot) -> Ordering + Send + Sync>;

/// Filter, order and count ceiling applied to a process listing.
///
/// A limit of 0 means unbounded. Sorting is stable; without one the order is
/// unspecified.
#[derive(Default)]
pub struct ProcessQuery {
    filter: Option<Predicate>,
    sort: Option<Comparator>,
    limit: usize,
}

impl ProcessQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ProcessSnapshot) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn sort<S>(mut self, sort: S) -> Self
    where
        S: Fn(&ProcessSnapshot, &ProcessSnapshot) -> Ordering + Send + Sync + 'static,
    {
        self.sort = Some(Box::new(sort));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Apply the query to already resolved snapshots.
    pub fn apply(&self, processes: Vec<ProcessSnapshot>) -> Vec<ProcessSnapshot> {
        let mut processes: Vec<_> = match &self.filter {
            Some(filter) => processes.into_iter().filter(|p| filter(p)).collect(),
            None => processes,
        };
        if let Some(sort) = &self.sort {
            processes.sort_by(|a, b| sort(a, b));
        }
        if self.limit > 0 {
            processes.truncate(self.limit);
        }
        processes
    }
}

impl fmt::Debug for ProcessQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessQuery")
            .field("filtered", &self.filter.is_some())
            .field("sorted", &self.sort.is_some())
            .field("limit", &self.limit)
            .finish()
    }
}

/// Entry point to the processes of one operating system.
#[derive(Clone)]
pub struct OperatingSystem {
    source: Arc<dyn ProcessSource>,
    version: OsVersion,
    config: Config,
}

impl Default for OperatingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatingSystem {
    /// The running system, read through its native gateway.
    pub fn new() -> Self {
        Self::with_source(Arc::new(NativeSource), OsVersion::detect())
    }

    /// A system read through `source`, reporting `version`.
    pub fn with_source(source: Arc<dyn ProcessSource>, version: OsVersion) -> Self {
        Self {
            source,
            version,
            config: Config::load(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn platform(&self) -> Platform {
        self.source.platform()
    }

    pub fn version(&self) -> OsVersion {
        self.version
    }

    /// Snapshot of `pid`, or `None` if it does not exist or cannot be read.
    pub fn get(&self, pid: i32) -> Option<ProcessSnapshot> {
        let snapshot = ProcessSnapshot::probe(Arc::clone(&self.source), pid, self.version);
        snapshot.is_valid().then_some(snapshot)
    }

    pub fn current_pid(&self) -> i32 {
        self.source.current_pid()
    }

    pub fn current_process(&self) -> Option<ProcessSnapshot> {
        self.get(self.current_pid())
    }

    /// Every live process matching `query`.
    pub fn processes(&self, query: &ProcessQuery) -> Vec<ProcessSnapshot> {
        query.apply(self.all_processes())
    }

    /// Snapshots of `pids`, each resolved at most once; unreadable ones are
    /// left out and the order is unspecified.
    pub fn processes_by_pids<I>(&self, pids: I) -> Vec<ProcessSnapshot>
    where
        I: IntoIterator<Item = i32>,
    {
        let mut seen = HashSet::new();
        let pids: Vec<i32> = pids.into_iter().filter(|pid| seen.insert(*pid)).collect();
        self.resolve(&pids)
    }

    /// Direct children of `ppid` matching `query`.
    pub fn child_processes(&self, ppid: i32, query: &ProcessQuery) -> Vec<ProcessSnapshot> {
        let children = self
            .all_processes()
            .into_iter()
            .filter(|p| p.parent_process_id() == ppid && p.pid() != ppid)
            .collect();
        query.apply(children)
    }

    /// Children of `ppid`, their children and so on, matching `query`.
    pub fn descendant_processes(&self, ppid: i32, query: &ProcessQuery) -> Vec<ProcessSnapshot> {
        let mut by_parent: HashMap<i32, Vec<ProcessSnapshot>> = HashMap::new();
        for process in self.all_processes() {
            if process.parent_process_id() != process.pid() {
                by_parent
                    .entry(process.parent_process_id())
                    .or_default()
                    .push(process);
            }
        }

        let mut descendants = Vec::new();
        let mut pending = VecDeque::from([ppid]);
        let mut visited = HashSet::from([ppid]);
        while let Some(parent) = pending.pop_front() {
            for child in by_parent.remove(&parent).unwrap_or_default() {
                if visited.insert(child.pid()) {
                    pending.push_back(child.pid());
                    descendants.push(child);
                }
            }
        }
        query.apply(descendants)
    }

    fn all_processes(&self) -> Vec<ProcessSnapshot> {
        match self.source.list_pids() {
            Ok(pids) => self.resolve(&pids),
            Err(err) => {
                log::warn!("unable to enumerate processes: {err}");
                Vec::new()
            }
        }
    }

    /// Probe `pids` on up to `config.threads` workers, dropping invalid ones.
    ///
    /// Each worker reads its share of `pids` as one batch.
    fn resolve(&self, pids: &[i32]) -> Vec<ProcessSnapshot> {
        let resolve_chunk = |chunk: &[i32]| {
            let batch = self.source.attributes_batch(chunk, self.version);
            chunk
                .iter()
                .zip(batch)
                .map(|(&pid, attributes)| {
                    let source = Arc::clone(&self.source);
                    ProcessSnapshot::with_attributes(source, pid, self.version, attributes)
                })
                .filter(ProcessSnapshot::is_valid)
                .collect::<Vec<_>>()
        };

        let threads = self.config.threads.get().min(pids.len());
        if threads <= 1 {
            return resolve_chunk(pids);
        }

        let chunk_size = pids.len().div_ceil(threads);
        thread::scope(|scope| {
            let workers: Vec<_> = pids
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || resolve_chunk(chunk)))
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| {
                    worker
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }
}

impl fmt::Debug for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatingSystem")
            .field("platform", &self.source.platform())
            .field("version", &self.version)
            .field("config", &self.config)
            .finish()
    }
}
