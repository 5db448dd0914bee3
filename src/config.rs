// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Runtime configuration read from environment variables.

use crate::error::{Error, Result};
use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Milliseconds to retain memoized values; negative retains them forever.
pub const MEMOIZER_EXPIRATION_VAR: &str = "PROCVIEW_MEMOIZER_EXPIRATION";
/// Number of worker threads used to resolve process listings.
pub const THREADS_VAR: &str = "PROCVIEW_THREADS";

const DEFAULT_MEMOIZER_EXPIRATION: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `None` keeps memoized values for the life of the process.
    pub memoizer_expiration: Option<Duration>,
    pub threads: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memoizer_expiration: Some(DEFAULT_MEMOIZER_EXPIRATION),
            threads: std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`Config::from_env`], but falls back to the defaults on bad input.
    pub fn load() -> Self {
        Self::from_env().unwrap_or_else(|err| {
            log::warn!("ignoring procview configuration: {err}");
            Self::default()
        })
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(MEMOIZER_EXPIRATION_VAR) {
            let millis = value.trim().parse::<i64>().map_err(|_| Error::Config {
                key: MEMOIZER_EXPIRATION_VAR,
                value: value.clone(),
            })?;
            config.memoizer_expiration = u64::try_from(millis).ok().map(Duration::from_millis);
        }

        if let Some(value) = lookup(THREADS_VAR) {
            config.threads = value
                .trim()
                .parse::<NonZeroUsize>()
                .map_err(|_| Error::Config {
                    key: THREADS_VAR,
                    value: value.clone(),
                })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.memoizer_expiration, Some(Duration::from_millis(300)));
        assert!(config.threads.get() >= 1);
    }

    #[test]
    fn test_expiration_override() {
        let config = Config::from_lookup(lookup(&[(MEMOIZER_EXPIRATION_VAR, "1500")])).unwrap();
        assert_eq!(config.memoizer_expiration, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_negative_expiration_retains_forever() {
        let config = Config::from_lookup(lookup(&[(MEMOIZER_EXPIRATION_VAR, "-1")])).unwrap();
        assert_eq!(config.memoizer_expiration, None);
    }

    #[test]
    fn test_threads_override() {
        let config = Config::from_lookup(lookup(&[(THREADS_VAR, "3")])).unwrap();
        assert_eq!(config.threads.get(), 3);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[(MEMOIZER_EXPIRATION_VAR, "soon")])).unwrap_err();
        assert_eq!(
            err,
            Error::Config {
                key: MEMOIZER_EXPIRATION_VAR,
                value: "soon".to_string()
            }
        );
        assert!(Config::from_lookup(lookup(&[(THREADS_VAR, "0")])).is_err());
    }
}
