// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Per-platform native gateways and attribute resolvers.

use crate::error::Result;
use crate::process::{ArgsEnv, ProcessAttributes};
use crate::version::{OsVersion, Platform};

pub mod helpers;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
mod fallback;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(unix)]
pub mod unix;
#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub use fallback::{os_release, NativeSource};
#[cfg(target_os = "linux")]
pub use linux::{os_release, NativeSource};
#[cfg(target_os = "macos")]
pub use macos::{os_release, NativeSource};
#[cfg(target_os = "windows")]
pub use windows::{os_release, NativeSource};

/// The capabilities one operating system offers for reading processes.
///
/// Implementations never fail for a process that has exited: they report it
/// as absent.
pub trait ProcessSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Every process id currently known to the kernel.
    fn list_pids(&self) -> Result<Vec<i32>>;

    fn current_pid(&self) -> i32;

    /// Read the attributes of `pid`, or `None` when it cannot be read.
    fn attributes(&self, pid: i32, version: OsVersion) -> Option<ProcessAttributes>;

    /// Read the attributes of each of `pids`, in order, against one view of
    /// the process table.
    ///
    /// Listings resolve through this; a single lookup always goes to
    /// [`ProcessSource::attributes`] and sees the live system.
    fn attributes_batch(
        &self,
        pids: &[i32],
        version: OsVersion,
    ) -> Vec<Option<ProcessAttributes>> {
        pids.iter().map(|&pid| self.attributes(pid, version)).collect()
    }

    /// Read the arguments and environment of `pid`; empty when unreadable.
    fn arguments(&self, pid: i32) -> ArgsEnv;
}
