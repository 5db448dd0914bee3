// This file is part of the procview package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

//! Expiring, single-flight memoization of expensive or near-static values.

use crate::config::Config;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

/// How often the configured default expiration is re-read.
const CONFIG_REFRESH: Duration = Duration::from_secs(60);

static DEFAULT_EXPIRATION: LazyLock<Memoizer<Option<Duration>>> = LazyLock::new(|| {
    Memoizer::new(
        || Config::load().memoizer_expiration,
        Some(CONFIG_REFRESH),
    )
});

/// Default time to live for memoized values, `None` meaning forever.
///
/// Controlled by [`crate::config::MEMOIZER_EXPIRATION_VAR`].
pub fn default_expiration() -> Option<Duration> {
    DEFAULT_EXPIRATION.get()
}

struct Slot<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Slot<T> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// A zero-argument computation whose result is kept for a time to live.
///
/// The first access computes the value. Accesses inside the time to live
/// return the stored value. Once it has expired exactly one caller recomputes
/// it while concurrent callers keep observing the previous value; callers only
/// wait when no value has ever been published.
pub struct Memoizer<T> {
    supplier: Box<dyn Fn() -> T + Send + Sync>,
    ttl: Option<Duration>,
    slot: RwLock<Option<Slot<T>>>,
    refresh: Mutex<()>,
}

impl<T: Clone> Memoizer<T> {
    /// Memoize `supplier` for `ttl`; `None` retains the value indefinitely.
    pub fn new<F>(supplier: F, ttl: Option<Duration>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            supplier: Box::new(supplier),
            ttl,
            slot: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Memoize `supplier` for the life of the process.
    pub fn forever<F>(supplier: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(supplier, None)
    }

    /// Memoize `supplier` for the configured [`default_expiration`].
    pub fn with_default_expiration<F>(supplier: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(supplier, default_expiration())
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn get(&self) -> T {
        if let Some(value) = self.fresh() {
            return value;
        }

        if let Some(_guard) = self.refresh.try_lock() {
            return self.recompute();
        }

        // Another caller is recomputing.
        if let Some(stale) = self.current() {
            return stale;
        }
        let _guard = self.refresh.lock();
        self.recompute()
    }

    /// Force the next access to recompute.
    pub fn expire(&self) {
        if let Some(slot) = self.slot.write().as_mut() {
            slot.expires_at = Some(Instant::now());
        }
    }

    fn fresh(&self) -> Option<T> {
        let now = Instant::now();
        self.slot
            .read()
            .as_ref()
            .filter(|slot| slot.is_fresh(now))
            .map(|slot| slot.value.clone())
    }

    fn current(&self) -> Option<T> {
        self.slot.read().as_ref().map(|slot| slot.value.clone())
    }

    // Caller holds `refresh`.
    fn recompute(&self) -> T {
        // Lost the race to a caller that already published.
        if let Some(value) = self.fresh() {
            return value;
        }
        let value = (self.supplier)();
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        *self.slot.write() = Some(Slot {
            value: value.clone(),
            expires_at,
        });
        value
    }
}

impl<T> fmt::Debug for Memoizer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("ttl", &self.ttl)
            .field("computed", &self.slot.read().is_some())
            .finish_non_exhaustive()
    }
}
