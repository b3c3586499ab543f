//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with lifespan and
//! max-idle expiry.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// == Entry Version ==
/// Opaque, ordered version stamp attached to an entry by its writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryVersion(pub u64);

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// == Cache Entry ==
/// A single stored key/value slot plus its version and expiry metadata.
///
/// Entries handed out by the container are snapshots: mutating the stored
/// slot afterwards does not change a copy a caller already holds.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<K, V> {
    key: K,
    value: V,
    version: Option<EntryVersion>,
    /// Time-to-live from creation, None = no expiration
    lifespan: Option<Duration>,
    /// Time-to-live from last use, None = no expiration
    max_idle: Option<Duration>,
    /// Creation timestamp (Unix milliseconds)
    created: u64,
    /// Last access timestamp (Unix milliseconds)
    last_used: u64,
    /// Number of times this slot was recreated after being found expired
    reincarnations: u64,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates an entry stamped with `now` for both creation and last use.
    pub(crate) fn new(
        key: K,
        value: V,
        version: Option<EntryVersion>,
        lifespan: Option<Duration>,
        max_idle: Option<Duration>,
        now: u64,
    ) -> Self {
        Self {
            key,
            value,
            version,
            lifespan,
            max_idle,
            created: now,
            last_used: now,
            reincarnations: 0,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn version(&self) -> Option<EntryVersion> {
        self.version
    }

    pub fn lifespan(&self) -> Option<Duration> {
        self.lifespan
    }

    pub fn max_idle(&self) -> Option<Duration> {
        self.max_idle
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn last_used(&self) -> u64 {
        self.last_used
    }

    pub fn reincarnations(&self) -> u64 {
        self.reincarnations
    }

    // == Can Expire ==
    /// True if either a lifespan or a max-idle time is set.
    pub fn can_expire(&self) -> bool {
        self.lifespan.is_some() || self.max_idle.is_some()
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: expiry is strict. An entry created at `t0` with
    /// lifespan `L` is still live at `t0 + L` and expired from `t0 + L + 1`.
    /// The same rule applies to max idle, measured from the last use.
    pub fn is_expired(&self, now: u64) -> bool {
        let past = |since: u64, limit: Option<Duration>| {
            limit.is_some_and(|d| now > since.saturating_add(millis(d)))
        };
        past(self.created, self.lifespan) || past(self.last_used, self.max_idle)
    }

    // == Expiry Time ==
    /// Earliest timestamp at which the entry counts as expired, if any.
    pub fn expiry_time(&self) -> Option<u64> {
        let by_lifespan = self
            .lifespan
            .map(|d| self.created.saturating_add(millis(d)).saturating_add(1));
        let by_idle = self
            .max_idle
            .map(|d| self.last_used.saturating_add(millis(d)).saturating_add(1));
        match (by_lifespan, by_idle) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if the entry cannot expire.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has not expired yet
    /// - `None` if the entry is eternal
    pub fn ttl_remaining_ms(&self, now: u64) -> Option<u64> {
        self.expiry_time().map(|at| at.saturating_sub(now.saturating_add(1)))
    }

    // == Mutators ==
    pub(crate) fn set_value(&mut self, value: V) {
        self.value = value;
    }

    pub(crate) fn set_version(&mut self, version: Option<EntryVersion>) {
        self.version = version;
    }

    /// Records a use, pushing back max-idle expiry.
    pub(crate) fn touch(&mut self, now: u64) {
        self.last_used = now;
    }

    /// Restamps the entry with fresh timestamps and expiry settings.
    pub(crate) fn renew(&mut self, lifespan: Option<Duration>, max_idle: Option<Duration>, now: u64) {
        self.lifespan = lifespan;
        self.max_idle = max_idle;
        self.created = now;
        self.last_used = now;
    }

    /// Marks a new generation of this slot.
    pub(crate) fn reincarnate(&mut self) {
        self.reincarnations += 1;
    }
}
