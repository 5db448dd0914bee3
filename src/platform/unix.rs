// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore getpwuid getgrgid ERANGE

//! User and group name lookups through the reentrant libc database calls.

use crate::error::{Error, Result};
use crate::layout::{self, StructLayout};
use libc::c_char;
use std::ffi::CStr;
use std::mem::{size_of, MaybeUninit};
use std::{ptr, slice};

const INITIAL_BUFFER: usize = 1024;
const MAX_BUFFER: usize = 1 << 20;

/// Run a `get*_r` lookup, growing the string buffer on `ERANGE`, and read the
/// name pointer of the returned record through `layout`.
fn lookup_name<R, Q>(
    call: &'static str,
    layout: &StructLayout,
    field: &str,
    query: Q,
) -> Result<Option<String>>
where
    Q: Fn(*mut R, &mut [u8], *mut *mut R) -> i32,
{
    let mut buf = vec![0u8; INITIAL_BUFFER];
    loop {
        let mut record = MaybeUninit::<R>::zeroed();
        let mut result: *mut R = ptr::null_mut();
        let rc = query(record.as_mut_ptr(), &mut buf, &mut result);

        if rc == libc::ERANGE && buf.len() < MAX_BUFFER {
            let grown = buf.len() * 2;
            buf.resize(grown, 0);
            continue;
        }
        if rc != 0 {
            return Err(Error::Native { call, code: rc });
        }
        if result.is_null() {
            return Ok(None);
        }

        // SAFETY: the record was zero-initialised and then filled by a
        // successful call; its string fields point into `buf`, which is alive.
        let bytes =
            unsafe { slice::from_raw_parts(record.as_ptr().cast::<u8>(), size_of::<R>()) };
        let name = layout.read_usize(bytes, field) as *const c_char;
        if name.is_null() {
            return Ok(None);
        }
        let name = unsafe { CStr::from_ptr(name) };
        return Ok(Some(name.to_string_lossy().into_owned()));
    }
}

/// Login name of `uid`, if the user database knows it.
pub fn user_name(uid: u32) -> Option<String> {
    let found = lookup_name::<libc::passwd, _>(
        "getpwuid_r",
        layout::passwd(),
        "pw_name",
        |pwd, buf, result| {
            // SAFETY: every pointer is valid for the duration of the call.
            unsafe {
                libc::getpwuid_r(
                    uid as libc::uid_t,
                    pwd,
                    buf.as_mut_ptr().cast::<c_char>(),
                    buf.len(),
                    result,
                )
            }
        },
    );
    found.unwrap_or_else(|err| {
        log::trace!("user {uid}: {err}");
        None
    })
}

/// Name of group `gid`, if the group database knows it.
pub fn group_name(gid: u32) -> Option<String> {
    let found = lookup_name::<libc::group, _>(
        "getgrgid_r",
        &layout::GROUP,
        "gr_name",
        |grp, buf, result| {
            // SAFETY: every pointer is valid for the duration of the call.
            unsafe {
                libc::getgrgid_r(
                    gid as libc::gid_t,
                    grp,
                    buf.as_mut_ptr().cast::<c_char>(),
                    buf.len(),
                    result,
                )
            }
        },
    );
    found.unwrap_or_else(|err| {
        log::trace!("group {gid}: {err}");
        None
    })
}
