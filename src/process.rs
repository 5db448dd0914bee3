// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::platform::ProcessSource;
use crate::version::OsVersion;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, OnceLock};

/// Macro to define ProcessState variants with their display names
macro_rules! define_states {
    ($($variant:ident => $name:expr),+ $(,)?) => {
        /// Canonical lifecycle state of a process.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub enum ProcessState {
            $(#[doc = concat!("Process state: ", $name)]
            $variant,)+
            /// The process vanished or its identity could not be confirmed.
            #[default]
            Invalid,
        }

        impl ProcessState {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                    Self::Invalid => "INVALID",
                }
            }
        }
    };
}

define_states!(
    New => "NEW",
    Running => "RUNNING",
    Sleeping => "SLEEPING",
    Waiting => "WAITING",
    Stopped => "STOPPED",
    Zombie => "ZOMBIE",
    Other => "OTHER",
);

impl Display for ProcessState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Environment variables in the order the process declared them.
///
/// Keys are unique; re-inserting a key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    entries: Vec<(String, String)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous value of `key`, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut environment = Self::new();
        for (key, value) in iter {
            environment.insert(key, value);
        }
        environment
    }
}

/// Result of the argument/environment channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgsEnv {
    pub arguments: Vec<String>,
    pub environment: Environment,
}

/// Attributes read from one probe of a live process.
///
/// Times are in milliseconds, sizes in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessAttributes {
    pub name: String,
    pub path: String,
    pub current_working_directory: Option<String>,
    pub user: Option<String>,
    pub user_id: String,
    pub group: Option<String>,
    pub group_id: String,
    pub state: ProcessState,
    pub parent_process_id: i32,
    pub thread_count: u32,
    pub priority: i32,
    pub virtual_size: u64,
    pub resident_set_size: u64,
    pub kernel_time: u64,
    pub user_time: u64,
    /// Epoch milliseconds.
    pub start_time: u64,
    pub up_time: u64,
    pub open_files: u64,
    /// Address width, 32 or 64; 0 when unknown.
    pub bitness: u32,
    pub minor_faults: u64,
    pub major_faults: u64,
    pub context_switches: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

pub(crate) fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// A point-in-time view of one process.
///
/// The attributes are replaced as a whole by [`ProcessSnapshot::refresh`].
/// Arguments, environment and command line come from a separate, more
/// expensive channel and are fetched on first use.
#[derive(Clone)]
pub struct ProcessSnapshot {
    pid: i32,
    source: Arc<dyn ProcessSource>,
    version: OsVersion,
    attributes: ProcessAttributes,
    args_env: OnceLock<ArgsEnv>,
    command_line: OnceLock<String>,
}

impl ProcessSnapshot {
    /// Probe `pid` through `source`.
    ///
    /// A process that cannot be read yields a snapshot in the
    /// [`ProcessState::Invalid`] state.
    pub fn probe(source: Arc<dyn ProcessSource>, pid: i32, version: OsVersion) -> Self {
        let attributes = source.attributes(pid, version);
        Self::with_attributes(source, pid, version, attributes)
    }

    /// Wrap attributes already read through `source`, as a listing does.
    pub(crate) fn with_attributes(
        source: Arc<dyn ProcessSource>,
        pid: i32,
        version: OsVersion,
        attributes: Option<ProcessAttributes>,
    ) -> Self {
        Self {
            pid,
            source,
            version,
            attributes: Self::validate(attributes),
            args_env: OnceLock::new(),
            command_line: OnceLock::new(),
        }
    }

    fn validate(attributes: Option<ProcessAttributes>) -> ProcessAttributes {
        match attributes {
            // A live process always has at least one thread.
            Some(attrs) if attrs.thread_count > 0 && attrs.state != ProcessState::Invalid => {
                ProcessAttributes {
                    up_time: up_time(attrs.start_time, now_millis()),
                    ..attrs
                }
            }
            _ => ProcessAttributes::default(),
        }
    }

    /// Re-probe the process, replacing every attribute.
    ///
    /// Returns whether the process is still valid.
    pub fn refresh(&mut self) -> bool {
        self.attributes = Self::validate(self.source.attributes(self.pid, self.version));
        self.args_env = OnceLock::new();
        self.command_line = OnceLock::new();
        self.is_valid()
    }

    pub fn is_valid(&self) -> bool {
        self.attributes.state != ProcessState::Invalid
    }

    pub fn attributes(&self) -> &ProcessAttributes {
        &self.attributes
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.attributes.name
    }

    pub fn path(&self) -> &str {
        &self.attributes.path
    }

    pub fn current_working_directory(&self) -> Option<&str> {
        self.attributes.current_working_directory.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.attributes.user.as_deref()
    }

    pub fn user_id(&self) -> &str {
        &self.attributes.user_id
    }

    pub fn group(&self) -> Option<&str> {
        self.attributes.group.as_deref()
    }

    pub fn group_id(&self) -> &str {
        &self.attributes.group_id
    }

    pub fn state(&self) -> ProcessState {
        self.attributes.state
    }

    pub fn parent_process_id(&self) -> i32 {
        self.attributes.parent_process_id
    }

    pub fn thread_count(&self) -> u32 {
        self.attributes.thread_count
    }

    pub fn priority(&self) -> i32 {
        self.attributes.priority
    }

    pub fn virtual_size(&self) -> u64 {
        self.attributes.virtual_size
    }

    pub fn resident_set_size(&self) -> u64 {
        self.attributes.resident_set_size
    }

    pub fn kernel_time(&self) -> u64 {
        self.attributes.kernel_time
    }

    pub fn user_time(&self) -> u64 {
        self.attributes.user_time
    }

    pub fn start_time(&self) -> u64 {
        self.attributes.start_time
    }

    /// Milliseconds between the start time and the last probe.
    pub fn up_time(&self) -> u64 {
        self.attributes.up_time
    }

    pub fn open_files(&self) -> u64 {
        self.attributes.open_files
    }

    pub fn bitness(&self) -> u32 {
        self.attributes.bitness
    }

    pub fn minor_faults(&self) -> u64 {
        self.attributes.minor_faults
    }

    pub fn major_faults(&self) -> u64 {
        self.attributes.major_faults
    }

    pub fn context_switches(&self) -> u64 {
        self.attributes.context_switches
    }

    pub fn bytes_read(&self) -> u64 {
        self.attributes.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.attributes.bytes_written
    }

    fn args_env(&self) -> &ArgsEnv {
        self.args_env.get_or_init(|| self.source.arguments(self.pid))
    }

    pub fn arguments(&self) -> &[String] {
        &self.args_env().arguments
    }

    pub fn environment(&self) -> &Environment {
        &self.args_env().environment
    }

    /// Arguments joined with single spaces.
    pub fn command_line(&self) -> &str {
        self.command_line.get_or_init(|| self.arguments().join(" "))
    }

    /// Fraction of its lifetime the process spent on a CPU.
    pub fn cpu_load_cumulative(&self) -> f64 {
        match self.attributes.up_time {
            0 => 0.0,
            up => (self.attributes.kernel_time + self.attributes.user_time) as f64 / up as f64,
        }
    }
}

fn up_time(start_time: u64, now: u64) -> u64 {
    if start_time == 0 {
        0
    } else {
        now.saturating_sub(start_time)
    }
}

impl fmt::Debug for ProcessSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSnapshot")
            .field("pid", &self.pid)
            .field("platform", &self.source.platform())
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}
