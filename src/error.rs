// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use std::io;
use thiserror::Error;

/// Errors reported by the native gateway and the configuration layer.
///
/// A process that disappears while it is being probed is not an error from the
/// caller's point of view: the facade turns such failures into "no result".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A native call failed; `code` is the OS error code captured right after it.
    #[error("{call} failed with OS error {code}")]
    Native { call: &'static str, code: i32 },
    /// A native call succeeded but its answer could not be decoded.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },
    /// Requested feature is not supported on this platform
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    /// A configuration variable holds an unusable value.
    #[error("invalid value {value:?} for {key}")]
    Config { key: &'static str, value: String },
    /// An operating system version string could not be parsed.
    #[error("unrecognized operating system version {0:?}")]
    Version(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// errno / GetLastError codes meaning the target is simply gone.
#[cfg(unix)]
const NOT_FOUND: i32 = libc::ENOENT;
#[cfg(unix)]
const GONE_CODES: &[i32] = &[libc::ESRCH, NOT_FOUND];
#[cfg(windows)]
const NOT_FOUND: i32 = 2; // ERROR_FILE_NOT_FOUND
#[cfg(windows)]
const GONE_CODES: &[i32] = &[87 /* ERROR_INVALID_PARAMETER */, NOT_FOUND];
#[cfg(not(any(unix, windows)))]
const NOT_FOUND: i32 = 0;
#[cfg(not(any(unix, windows)))]
const GONE_CODES: &[i32] = &[];

impl Error {
    /// Capture the calling thread's last OS error for `call`.
    ///
    /// Must be invoked immediately after the failing call, before anything
    /// else has a chance to overwrite `errno` / `GetLastError()`.
    pub fn last_os_error(call: &'static str) -> Self {
        Self::from_io(call, io::Error::last_os_error())
    }

    pub fn from_io(call: &'static str, err: io::Error) -> Self {
        let code = err.raw_os_error().unwrap_or(match err.kind() {
            io::ErrorKind::NotFound => NOT_FOUND,
            _ => 0,
        });
        Self::Native { call, code }
    }

    pub fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            reason: reason.into(),
        }
    }

    /// The OS error code carried by a [`Error::Native`] failure.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Native { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure means the process no longer exists.
    pub fn is_gone(&self) -> bool {
        self.code().is_some_and(|code| GONE_CODES.contains(&code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_native() {
        let err = Error::Native {
            call: "proc_pidinfo",
            code: 3,
        };
        assert_eq!(err.to_string(), "proc_pidinfo failed with OS error 3");
    }

    #[test]
    fn test_from_io_keeps_raw_code() {
        let err = Error::from_io("open", io::Error::from_raw_os_error(13));
        assert_eq!(err.code(), Some(13));
    }

    #[test]
    #[cfg(unix)]
    fn test_is_gone() {
        assert!(Error::from_io("read", io::Error::from_raw_os_error(libc::ESRCH)).is_gone());
        assert!(Error::from_io("read", io::ErrorKind::NotFound.into()).is_gone());
        assert!(!Error::from_io("read", io::Error::from_raw_os_error(libc::EACCES)).is_gone());
        assert!(!Error::Unsupported("sysctl").is_gone());
    }

    #[test]
    fn test_malformed() {
        let err = Error::malformed("procargs", "argument count 0");
        assert_eq!(err.to_string(), "malformed procargs: argument count 0");
        assert_eq!(err.code(), None);
    }
}
