// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt::{self, Display, Formatter};
use std::sync::LazyLock;

/// Operating system family the crate was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
    Unsupported,
}

impl Platform {
    /// The family of the running build target.
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Unsupported
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
            Self::Windows => "Windows",
            Self::Unsupported => "Unsupported Operating System",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)(?:\.(\d+))?").unwrap());

/// Major/minor release of the running kernel or OS product.
///
/// Version-gated probes (such as `rusage_info_v2` on macOS) compare against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
}

impl OsVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse the leading `major[.minor]` of strings such as `14.2.1` or
    /// `6.8.0-45-generic`.
    pub fn parse(value: &str) -> Result<Self> {
        let captures = VERSION_REGEX
            .captures(value)
            .ok_or_else(|| Error::Version(value.to_string()))?;
        let number = |index: usize| -> Result<u32> {
            captures
                .get(index)
                .map_or(Ok(0), |m| m.as_str().parse::<u32>())
                .map_err(|_| Error::Version(value.to_string()))
        };
        Ok(Self::new(number(1)?, number(2)?))
    }

    /// Whether this version is `major.minor` or newer.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        *self >= Self::new(major, minor)
    }

    /// Ask the running system for its version.
    ///
    /// Falls back to `0.0` when the system does not answer, which disables
    /// every version-gated probe.
    pub fn detect() -> Self {
        crate::platform::os_release()
            .and_then(|release| Self::parse(&release))
            .unwrap_or_else(|err| {
                log::debug!("unable to detect the operating system version: {err}");
                Self::default()
            })
    }
}

impl Display for OsVersion {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
