// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore procargs argc

//! Decoding of the argument/environment channel.
//!
//! On macOS `KERN_PROCARGS2` returns one blob laid out as
//!
//! ```text
//! [argc: i32][exec_path\0][\0 padding][argv[0]\0]..[argv[argc-1]\0][KEY=VALUE\0]..[\0]
//! ```
//!
//! The end of the buffer always stops decoding. Arguments end once `argc`
//! strings have been read; the environment ends at the first empty string.
//! An empty `argv[0]` looks exactly like padding and is skipped with it, so
//! the arguments of such a process shift by one into the environment region.
//! Linux exposes the same information as two NUL separated files.

use crate::error::{Error, Result};
use crate::process::{ArgsEnv, Environment};
use std::mem::size_of;

/// Largest argument count accepted from a kernel blob.
pub const MAX_ARGC: i32 = 4096;

/// Cursor over NUL terminated strings inside a bounded buffer.
struct NulStrings<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> NulStrings<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn skip_nuls(&mut self) {
        while self.buf.get(self.pos) == Some(&0) {
            self.pos += 1;
        }
    }

    /// Next string, or `None` at the buffer boundary. An unterminated string
    /// runs to the boundary.
    fn next_str(&mut self) -> Option<String> {
        if self.at_end() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        self.pos += len + 1;
        Some(String::from_utf8_lossy(&rest[..len]).into_owned())
    }
}

/// Decode a `KERN_PROCARGS2` blob.
pub fn decode_procargs2(blob: &[u8]) -> Result<ArgsEnv> {
    let Some(head) = blob.get(..size_of::<i32>()) else {
        return Err(Error::malformed(
            "procargs",
            format!("{} byte buffer has no argument count", blob.len()),
        ));
    };
    let argc = i32::from_ne_bytes([head[0], head[1], head[2], head[3]]);
    if !(1..=MAX_ARGC).contains(&argc) {
        return Err(Error::malformed(
            "procargs",
            format!("argument count {argc}"),
        ));
    }

    let mut strings = NulStrings::new(blob, size_of::<i32>());
    // Executable path, then the padding that aligns argv[0].
    strings.next_str();
    strings.skip_nuls();

    let mut arguments = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        match strings.next_str() {
            Some(arg) => arguments.push(arg),
            None => break,
        }
    }

    let environment = parse_environment(
        std::iter::from_fn(|| strings.next_str()).take_while(|entry| !entry.is_empty()),
    );

    Ok(ArgsEnv {
        arguments,
        environment,
    })
}

/// Like [`decode_procargs2`], but reports failure as an empty result.
///
/// Pseudo-processes such as pid 0 never have a readable blob, so only
/// failures for real processes are logged.
pub fn parse_procargs2(blob: &[u8], pid: i32) -> ArgsEnv {
    decode_procargs2(blob).unwrap_or_else(|err| {
        if pid > 0 {
            log::warn!("unable to decode arguments of process {pid}: {err}");
        }
        ArgsEnv::default()
    })
}

/// Split a NUL separated file such as `/proc/<pid>/cmdline`.
///
/// The trailing terminator does not produce an empty element; embedded empty
/// strings are kept.
pub fn parse_nul_separated(bytes: &[u8]) -> Vec<String> {
    let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
    if bytes.is_empty() {
        return Vec::new();
    }
    bytes
        .split(|&b| b == 0)
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

/// Build an environment from `KEY=VALUE` strings.
///
/// Entries without `=` or with an empty key are dropped. A repeated key keeps
/// its first position and takes the later value.
pub fn parse_environment<I, S>(entries: I) -> Environment
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut environment = Environment::new();
    for entry in entries {
        match entry.as_ref().split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                environment.insert(key, value);
            }
            _ => {}
        }
    }
    environment
}
