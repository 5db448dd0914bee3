// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

use crate::error::Result;

/// Total attempts of [`two_phase`] before a full buffer is accepted as is.
pub const MAX_PROBE_ATTEMPTS: usize = 3;

/// Capacity allocated for a probed element count.
fn with_headroom(needed: usize) -> usize {
    needed.saturating_add(needed / 8).max(16)
}

/// Size-probe-then-fetch for native calls that fill a caller buffer.
///
/// `probe` reports how many elements the call currently needs; `fetch` fills
/// the buffer and reports how many elements it wrote. The answer may shrink
/// between the two calls. A buffer filled to capacity may have been
/// truncated, so the probe is repeated up to [`MAX_PROBE_ATTEMPTS`] times
/// before the last answer is returned truncated.
pub fn two_phase<T, P, F>(what: &str, mut probe: P, mut fetch: F) -> Result<Vec<T>>
where
    T: Copy + Default,
    P: FnMut() -> Result<usize>,
    F: FnMut(&mut [T]) -> Result<usize>,
{
    let mut attempt = 1;
    loop {
        let capacity = with_headroom(probe()?);
        let mut buf = vec![T::default(); capacity];
        let filled = fetch(&mut buf)?.min(capacity);

        if filled < capacity {
            buf.truncate(filled);
            return Ok(buf);
        }
        if attempt >= MAX_PROBE_ATTEMPTS {
            log::debug!("{what}: still full after {attempt} attempts, keeping {capacity} elements");
            return Ok(buf);
        }
        log::debug!("{what}: buffer of {capacity} elements filled, probing again");
        attempt += 1;
    }
}

/// Decode a NUL terminated byte string; a missing terminator ends at the slice end.
pub fn c_string_to_rust(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Decode a NUL terminated UTF-16 string; a missing terminator ends at the slice end.
pub fn wide_string_to_rust(units: &[u16]) -> String {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::cell::RefCell;

    /// A process table whose size changes between calls.
    fn table(sizes: &[usize]) -> (RefCell<Vec<usize>>, RefCell<usize>) {
        (RefCell::new(sizes.to_vec()), RefCell::new(0))
    }

    #[test]
    fn test_headroom() {
        assert_eq!(with_headroom(0), 16);
        assert_eq!(with_headroom(100), 112);
        assert_eq!(with_headroom(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_shrink_is_accepted() {
        let pids: Vec<i32> = two_phase("pids", || Ok(400), |buf: &mut [i32]| {
            for (i, slot) in buf.iter_mut().take(390).enumerate() {
                *slot = i as i32;
            }
            Ok(390)
        })
        .unwrap();
        assert_eq!(pids.len(), 390);
        assert_eq!(pids[389], 389);
    }

    #[test]
    fn test_growth_within_headroom() {
        let pids: Vec<i32> = two_phase("pids", || Ok(400), |_: &mut [i32]| Ok(420)).unwrap();
        assert_eq!(pids.len(), 420);
    }

    #[test]
    fn test_growth_past_headroom_reprobes() {
        // The table grows beyond the headroom once, then settles.
        let (sizes, calls) = table(&[100, 200]);
        let result: Vec<u8> = two_phase(
            "pids",
            || {
                *calls.borrow_mut() += 1;
                let mut sizes = sizes.borrow_mut();
                Ok(if sizes.len() > 1 { sizes.remove(0) } else { sizes[0] })
            },
            |buf: &mut [u8]| Ok(buf.len().min(200)),
        )
        .unwrap();
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(result.len(), 200);
    }

    #[test]
    fn test_always_full_is_truncated() {
        let calls = RefCell::new(0);
        let result: Vec<u8> = two_phase(
            "sysctl",
            || {
                *calls.borrow_mut() += 1;
                Ok(32)
            },
            |buf: &mut [u8]| Ok(buf.len() + 10),
        )
        .unwrap();
        assert_eq!(*calls.borrow(), MAX_PROBE_ATTEMPTS);
        assert_eq!(result.len(), 36);
    }

    #[test]
    fn test_errors_propagate() {
        let failing = Error::Native {
            call: "proc_listpids",
            code: 1,
        };
        let err = two_phase::<i32, _, _>("pids", || Err(failing.clone()), |_| Ok(0)).unwrap_err();
        assert_eq!(err, failing);
        let err = two_phase::<i32, _, _>("pids", || Ok(4), |_| Err(failing.clone())).unwrap_err();
        assert_eq!(err, failing);
    }

    #[test]
    fn test_strings() {
        assert_eq!(c_string_to_rust(b"zsh\0\0garbage"), "zsh");
        assert_eq!(c_string_to_rust(b"unterminated"), "unterminated");
        let wide: Vec<u16> = "C:\\Windows".encode_utf16().chain([0, 65]).collect();
        assert_eq!(wide_string_to_rust(&wide), "C:\\Windows");
    }
}
