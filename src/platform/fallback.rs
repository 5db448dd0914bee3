// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::error::{Error, Result};
use crate::platform::ProcessSource;
use crate::process::{ArgsEnv, ProcessAttributes};
use crate::version::{OsVersion, Platform};

pub fn os_release() -> Result<String> {
    Err(Error::Unsupported("operating system version query"))
}

/// Process source for targets without a native gateway.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeSource;

impl ProcessSource for NativeSource {
    fn platform(&self) -> Platform {
        Platform::Unsupported
    }

    fn list_pids(&self) -> Result<Vec<i32>> {
        Err(Error::Unsupported("process enumeration"))
    }

    fn current_pid(&self) -> i32 {
        std::process::id() as i32
    }

    fn attributes(&self, _pid: i32, _version: OsVersion) -> Option<ProcessAttributes> {
        None
    }

    fn arguments(&self, _pid: i32) -> ArgsEnv {
        ArgsEnv::default()
    }
}
