//! Data Container Module
//!
//! Concurrent entry store combining lazy expiry on read, a bulk expiry
//! sweep and, when bounded, capacity eviction with passivation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::container::bounded::{BoundedMap, SegmentIter};
use crate::container::entry::{CacheEntry, EntryVersion};
use crate::container::eviction::{EvictionStrategy, EvictionThreadPolicy};
use crate::container::factory::EntryFactory;
use crate::container::listener::{ContainerEvictionListener, EvictionManager, NoopPassivator, Passivator};
use crate::container::views::{EntrySet, KeySet, Values};
use crate::error::{CacheError, Result};
use crate::{CacheKey, CacheValue};

// == Collaborators ==
/// Everything a container calls out to besides its own map.
pub struct Collaborators<K, V> {
    pub entry_factory: EntryFactory,
    pub eviction_manager: Arc<dyn EvictionManager<K, V>>,
    pub passivator: Arc<dyn Passivator<K, V>>,
}

impl<K, V> Collaborators<K, V> {
    /// Collaborators with the system clock and no backing store.
    pub fn new(eviction_manager: Arc<dyn EvictionManager<K, V>>) -> Self {
        Self {
            entry_factory: EntryFactory::default(),
            eviction_manager,
            passivator: Arc::new(NoopPassivator),
        }
    }

    pub fn with_entry_factory(mut self, entry_factory: EntryFactory) -> Self {
        self.entry_factory = entry_factory;
        self
    }

    pub fn with_passivator(mut self, passivator: Arc<dyn Passivator<K, V>>) -> Self {
        self.passivator = passivator;
        self
    }
}

/// Outcome of an expiry-aware lookup that leaves expired entries in place.
#[derive(Debug, Clone)]
pub(crate) enum Lookup<K, V> {
    Hit(CacheEntry<K, V>),
    Expired,
    Miss,
}

enum EntryMap<K, V> {
    Unbounded(DashMap<K, CacheEntry<K, V>>),
    Bounded(BoundedMap<K, V>),
}

// == Data Container ==
/// Concurrent store of cache entries.
///
/// The unbounded flavor shards its map so writes to unrelated keys do not
/// block each other. The bounded flavor stripes its map into segments that
/// each enforce their share of the entry limit.
pub struct DataContainer<K, V> {
    entries: EntryMap<K, V>,
    factory: EntryFactory,
    eviction_manager: Arc<dyn EvictionManager<K, V>>,
    passivator: Arc<dyn Passivator<K, V>>,
}

impl<K: CacheKey, V: CacheValue> DataContainer<K, V> {
    // == Constructors ==
    /// Creates a container with no entry limit.
    ///
    /// # Arguments
    /// * `concurrency_level` - Expected number of concurrent writers, used to size the shard count
    /// * `collaborators` - Entry factory, eviction manager and passivator
    pub fn unbounded(concurrency_level: usize, collaborators: Collaborators<K, V>) -> Self {
        let shards = concurrency_level.max(2).next_power_of_two();
        Self {
            entries: EntryMap::Unbounded(DashMap::with_shard_amount(shards)),
            factory: collaborators.entry_factory,
            eviction_manager: collaborators.eviction_manager,
            passivator: collaborators.passivator,
        }
    }

    /// Creates a container holding at most `max_entries` entries.
    ///
    /// # Arguments
    /// * `concurrency_level` - Expected number of concurrent writers, used to size the segment count
    /// * `max_entries` - Hard entry limit, must be non-zero
    /// * `strategy` - Victim selection strategy
    /// * `thread_policy` - Where eviction callbacks run
    /// * `collaborators` - Entry factory, eviction manager and passivator
    ///
    /// # Errors
    /// Returns `CacheError::Configuration` for a zero limit or a strategy
    /// that cannot drive a bounded container.
    pub fn bounded(
        concurrency_level: usize,
        max_entries: usize,
        strategy: EvictionStrategy,
        thread_policy: EvictionThreadPolicy,
        collaborators: Collaborators<K, V>,
    ) -> Result<Self> {
        if max_entries == 0 {
            return Err(CacheError::Configuration(
                "A bounded container needs max_entries greater than zero".to_string(),
            ));
        }
        let eviction = strategy.resolve()?;
        if !thread_policy.runs_inline() {
            return Err(CacheError::Configuration(format!(
                "No such eviction thread policy {}",
                thread_policy
            )));
        }

        let listener = Arc::new(ContainerEvictionListener::new(
            collaborators.eviction_manager.clone(),
            collaborators.passivator.clone(),
        ));
        let map = BoundedMap::new(max_entries, concurrency_level, eviction, listener);
        debug!(
            max_entries,
            segments = map.segment_count(),
            %strategy,
            %thread_policy,
            "Created bounded container"
        );

        Ok(Self {
            entries: EntryMap::Bounded(map),
            factory: collaborators.entry_factory,
            eviction_manager: collaborators.eviction_manager,
            passivator: collaborators.passivator,
        })
    }

    /// Picks the bounded or unbounded flavor from a [`Config`].
    pub fn from_config(config: &Config, collaborators: Collaborators<K, V>) -> Result<Self> {
        if config.is_bounded() {
            Self::bounded(
                config.concurrency_level,
                config.max_entries,
                config.eviction_strategy,
                config.thread_policy,
                collaborators,
            )
        } else {
            Ok(Self::unbounded(config.concurrency_level, collaborators))
        }
    }

    /// Current time according to the container's clock.
    pub fn now(&self) -> u64 {
        self.factory.now()
    }

    /// Entry limit, or `None` when unbounded.
    pub fn max_entries(&self) -> Option<usize> {
        match &self.entries {
            EntryMap::Unbounded(_) => None,
            EntryMap::Bounded(map) => Some(map.max_entries()),
        }
    }

    // == Lookups ==
    /// Returns the live entry for `key`, touching it.
    ///
    /// An expired entry is removed and reported as absent. Of several
    /// callers racing on the same expired entry, only one removes it.
    pub fn get(&self, key: &K) -> Option<CacheEntry<K, V>> {
        let now = self.now();
        match &self.entries {
            EntryMap::Bounded(map) => map.get(key, now),
            EntryMap::Unbounded(map) => {
                match map.get_mut(key) {
                    None => return None,
                    Some(mut entry) if !entry.is_expired(now) => {
                        entry.touch(now);
                        return Some((*entry).clone());
                    }
                    Some(_) => {}
                }
                map.remove_if(key, |_, e| e.is_expired(now));
                None
            }
        }
    }

    /// Single expiry-aware observation of `key`, touching a live hit when
    /// asked. An expired entry is reported but not removed.
    pub(crate) fn lookup(&self, key: &K, touch: bool) -> Lookup<K, V> {
        let now = self.now();
        match &self.entries {
            EntryMap::Bounded(map) => map.lookup(key, now, touch),
            EntryMap::Unbounded(map) => match map.get_mut(key) {
                None => Lookup::Miss,
                Some(entry) if entry.is_expired(now) => Lookup::Expired,
                Some(mut entry) => {
                    if touch {
                        entry.touch(now);
                    }
                    Lookup::Hit((*entry).clone())
                }
            },
        }
    }

    /// Returns the stored entry without expiry checks or touching.
    pub fn peek(&self, key: &K) -> Option<CacheEntry<K, V>> {
        match &self.entries {
            EntryMap::Bounded(map) => map.peek(key),
            EntryMap::Unbounded(map) => map.get(key).map(|e| (*e).clone()),
        }
    }

    /// Expiry-aware presence check that does not touch the entry.
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.now();
        match &self.entries {
            EntryMap::Bounded(map) => map.contains_key(key, now),
            EntryMap::Unbounded(map) => {
                let expired = match map.get(key) {
                    None => return false,
                    Some(entry) => entry.is_expired(now),
                };
                if expired {
                    map.remove_if(key, |_, e| e.is_expired(now));
                }
                !expired
            }
        }
    }

    // == Put ==
    /// Inserts or overwrites the entry for `key`.
    ///
    /// On a bounded container at capacity, victims are passivated, removed
    /// and reported to the eviction manager before this returns.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `version` - Optional version stamp
    /// * `lifespan` - Time to live from creation, `None` for no limit
    /// * `max_idle` - Time to live since last access, `None` for no limit
    pub fn put(
        &self,
        key: K,
        value: V,
        version: Option<EntryVersion>,
        lifespan: Option<Duration>,
        max_idle: Option<Duration>,
    ) {
        trace!(key = ?key, "Put");
        match &self.entries {
            EntryMap::Bounded(map) => map.put(key, value, version, lifespan, max_idle, &self.factory),
            EntryMap::Unbounded(map) => match map.entry(key) {
                Entry::Occupied(mut occupied) => {
                    apply_write(occupied.get_mut(), value, version, lifespan, max_idle, &self.factory);
                }
                Entry::Vacant(vacant) => {
                    let entry =
                        self.factory
                            .create(vacant.key().clone(), value, version, lifespan, max_idle);
                    vacant.insert(entry);
                }
            },
        }
    }

    // == Removal ==
    /// Removes the entry for `key`, returning it unless it had already expired.
    pub fn remove(&self, key: &K) -> Option<CacheEntry<K, V>> {
        let now = self.now();
        self.take(key).filter(|entry| !entry.is_expired(now))
    }

    /// Removes the entry for `key` whether expired or not.
    pub(crate) fn take(&self, key: &K) -> Option<CacheEntry<K, V>> {
        match &self.entries {
            EntryMap::Bounded(map) => map.take(key),
            EntryMap::Unbounded(map) => map.remove(key).map(|(_, entry)| entry),
        }
    }

    /// Removes the entry for `key` only if it is expired at `now`.
    ///
    /// A write that renewed the entry after it was seen expired keeps it
    /// alive; of several callers racing to remove the same expired entry,
    /// exactly one gets it.
    pub(crate) fn take_if_expired(&self, key: &K, now: u64) -> Option<CacheEntry<K, V>> {
        match &self.entries {
            EntryMap::Bounded(map) => map.take_if_expired(key, now),
            EntryMap::Unbounded(map) => map
                .remove_if(key, |_, entry| entry.is_expired(now))
                .map(|(_, entry)| entry),
        }
    }

    /// Passivates and then removes the entry for `key`.
    ///
    /// The passivator sees the entry while it is still stored. No eviction
    /// notification is sent; callers that need one send it themselves.
    pub fn evict(&self, key: &K) -> Option<CacheEntry<K, V>> {
        let passivator = &self.passivator;
        let evicted = match &self.entries {
            EntryMap::Bounded(map) => map.remove_with(key, |entry| passivator.passivate(entry)),
            EntryMap::Unbounded(map) => map
                .remove_if(key, |_, entry| {
                    passivator.passivate(entry);
                    true
                })
                .map(|(_, entry)| entry),
        };
        if evicted.is_some() {
            trace!(key = ?key, "Evicted entry on request");
        }
        evicted
    }

    /// Number of stored entries, expired or not.
    pub fn size(&self) -> usize {
        match &self.entries {
            EntryMap::Bounded(map) => map.len(),
            EntryMap::Unbounded(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drops every entry without notifying anyone.
    pub fn clear(&self) {
        match &self.entries {
            EntryMap::Bounded(map) => map.clear(),
            EntryMap::Unbounded(map) => map.clear(),
        }
    }

    // == Views ==
    /// Read-only view over the stored keys.
    pub fn key_set(&self) -> KeySet<'_, K, V> {
        KeySet::new(self)
    }

    /// Read-only view over the stored values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self)
    }

    /// Read-only view over snapshots of the stored entries.
    pub fn entry_set(&self) -> EntrySet<'_, K, V> {
        EntrySet::new(self)
    }

    /// Single pass over the stored entries, expired ones included.
    pub fn iter(&self) -> EntryIter<'_, K, V> {
        let inner = match &self.entries {
            EntryMap::Bounded(map) => IterInner::Bounded(map.iter()),
            EntryMap::Unbounded(map) => IterInner::Unbounded(map.iter()),
        };
        EntryIter { inner }
    }

    pub(crate) fn contains_raw(&self, key: &K) -> bool {
        match &self.entries {
            EntryMap::Bounded(map) => map.contains_raw(key),
            EntryMap::Unbounded(map) => map.contains_key(key),
        }
    }

    // == Purge ==
    /// Removes every expired entry and reports them in one batch.
    ///
    /// Live entries are left untouched. Returns the number of entries purged.
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let purged = match &self.entries {
            EntryMap::Bounded(map) => map.drain_expired(now),
            EntryMap::Unbounded(map) => {
                let mut purged = HashMap::new();
                map.retain(|key, entry| {
                    if entry.is_expired(now) {
                        purged.insert(key.clone(), entry.clone());
                        false
                    } else {
                        true
                    }
                });
                purged
            }
        };

        let count = purged.len();
        if count > 0 {
            info!(count, "Purged expired entries");
            self.eviction_manager.on_entry_expiration(&purged);
        }
        count
    }
}

// == Entry Iterator ==
/// Iterator returned by [`DataContainer::iter`].
///
/// Yields copies of the entries; never restarts.
pub struct EntryIter<'a, K, V> {
    inner: IterInner<'a, K, V>,
}

enum IterInner<'a, K, V> {
    Unbounded(dashmap::iter::Iter<'a, K, CacheEntry<K, V>>),
    Bounded(SegmentIter<'a, K, V>),
}

impl<K: CacheKey, V: CacheValue> Iterator for EntryIter<'_, K, V> {
    type Item = CacheEntry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            IterInner::Unbounded(iter) => iter.next().map(|e| (*e).clone()),
            IterInner::Bounded(iter) => iter.next(),
        }
    }
}

/// Replaces value and version in place, then restamps the entry, bumping
/// its reincarnation counter when the slot had already expired.
pub(crate) fn apply_write<K: std::fmt::Debug, V>(
    entry: &mut CacheEntry<K, V>,
    value: V,
    version: Option<EntryVersion>,
    lifespan: Option<Duration>,
    max_idle: Option<Duration>,
    factory: &EntryFactory,
) {
    entry.set_value(value);
    entry.set_version(version);
    if factory.update(entry, lifespan, max_idle) {
        entry.reincarnate();
        trace!(key = ?entry.key(), generation = entry.reincarnations(), "Reincarnated expired entry");
    }
}
