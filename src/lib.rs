// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Cross-platform process snapshots
//!
//! This crate decodes the native kernel records of each supported platform
//! (libproc on macOS, `/proc` on Linux, toolhelp snapshots on Windows) into one
//! normalized [`ProcessSnapshot`] and exposes filter, sort and limit queries
//! over the live process table.
//!
//! # Example
//!
//! ```no_run
//! use procview::{filtering, sorting, OperatingSystem, ProcessQuery};
//!
//! let os = OperatingSystem::new();
//! let query = ProcessQuery::new()
//!     .filter(filtering::BITNESS_64)
//!     .sort(sorting::RSS_DESC)
//!     .limit(5);
//! for process in os.processes(&query) {
//!     println!("{:>7} {:>12} {}", process.pid(), process.resident_set_size(), process.name());
//! }
//! ```

pub mod config;
pub mod error;
pub mod layout;
pub mod memoize;
pub mod os;
pub mod platform;
pub mod procargs;
pub mod process;
pub mod version;

// Re-export commonly used types and functions
pub use config::Config;
pub use error::{Error, Result};
pub use memoize::Memoizer;
pub use os::{filtering, sorting, OperatingSystem, ProcessQuery};
pub use platform::{NativeSource, ProcessSource};
pub use process::{ArgsEnv, Environment, ProcessAttributes, ProcessSnapshot, ProcessState};
pub use version::{OsVersion, Platform};
