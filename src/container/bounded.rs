//! Bounded Map Module
//!
//! Lock-striped map with a hard entry limit. Keys hash onto a fixed set of
//! segments; each segment owns a slice of the total capacity and its own
//! eviction policy, guarded by one mutex. Writes to different segments never
//! contend, and because a segment never holds more than its slice, the map
//! as a whole never holds more than its maximum.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::container::entry::{CacheEntry, EntryVersion};
use crate::container::eviction::{new_policy, Eviction, EvictionPolicy};
use crate::container::factory::EntryFactory;
use crate::container::listener::{EntryBatch, EvictionListener};
use crate::container::store::{apply_write, Lookup};
use crate::{CacheKey, CacheValue};

struct Segment<K, V> {
    entries: HashMap<K, CacheEntry<K, V>>,
    policy: Box<dyn EvictionPolicy<K>>,
    capacity: usize,
}

impl<K: CacheKey, V: CacheValue> Segment<K, V> {
    fn forget(&mut self, key: &K) -> Option<CacheEntry<K, V>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.policy.record_removal(key);
        }
        removed
    }
}

// == Bounded Map ==
pub(crate) struct BoundedMap<K, V> {
    segments: Box<[Mutex<Segment<K, V>>]>,
    hasher: RandomState,
    max_entries: usize,
    listener: Arc<dyn EvictionListener<K, V>>,
}

impl<K: CacheKey, V: CacheValue> BoundedMap<K, V> {
    /// Creates a map holding at most `max_entries` (must be non-zero).
    ///
    /// The segment count is the concurrency hint rounded up to a power of
    /// two, capped at `max_entries` so every segment can hold an entry.
    pub(crate) fn new(
        max_entries: usize,
        concurrency_level: usize,
        eviction: Eviction,
        listener: Arc<dyn EvictionListener<K, V>>,
    ) -> Self {
        let count = concurrency_level
            .max(1)
            .next_power_of_two()
            .min(max_entries)
            .max(1);
        let base = max_entries / count;
        let remainder = max_entries % count;

        let segments = (0..count)
            .map(|i| {
                let capacity = base + usize::from(i < remainder);
                Mutex::new(Segment {
                    entries: HashMap::with_capacity(capacity.min(1024)),
                    policy: new_policy(eviction, capacity),
                    capacity,
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            segments,
            hasher: RandomState::new(),
            max_entries,
            listener,
        }
    }

    fn segment_for(&self, key: &K) -> &Mutex<Segment<K, V>> {
        let hash = self.hasher.hash_one(key);
        &self.segments[(hash as usize) % self.segments.len()]
    }

    pub(crate) fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn peek(&self, key: &K) -> Option<CacheEntry<K, V>> {
        self.segment_for(key).lock().entries.get(key).cloned()
    }

    /// Expiry-aware lookup; touches live hits and drops expired ones.
    pub(crate) fn get(&self, key: &K, now: u64) -> Option<CacheEntry<K, V>> {
        let mut segment = self.segment_for(key).lock();
        let expired = segment.entries.get(key)?.is_expired(now);
        if expired {
            segment.forget(key);
            return None;
        }
        segment.policy.record_access(key);
        let entry = segment.entries.get_mut(key)?;
        entry.touch(now);
        Some(entry.clone())
    }

    /// Like [`get`](Self::get), but an expired entry is reported and left
    /// in place for the caller to expire.
    pub(crate) fn lookup(&self, key: &K, now: u64, touch: bool) -> Lookup<K, V> {
        let mut segment = self.segment_for(key).lock();
        let expired = match segment.entries.get(key) {
            None => return Lookup::Miss,
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            return Lookup::Expired;
        }
        if touch {
            segment.policy.record_access(key);
        }
        match segment.entries.get_mut(key) {
            Some(entry) => {
                if touch {
                    entry.touch(now);
                }
                Lookup::Hit(entry.clone())
            }
            None => Lookup::Miss,
        }
    }

    pub(crate) fn contains_key(&self, key: &K, now: u64) -> bool {
        let mut segment = self.segment_for(key).lock();
        match segment.entries.get(key).map(|e| e.is_expired(now)) {
            None => false,
            Some(true) => {
                segment.forget(key);
                false
            }
            Some(false) => true,
        }
    }

    pub(crate) fn contains_raw(&self, key: &K) -> bool {
        self.segment_for(key).lock().entries.contains_key(key)
    }

    /// Upsert. A new key landing on a full segment first evicts victims
    /// chosen by the segment's policy; passivation runs for each victim
    /// before it is removed, and the eviction batch is reported once the
    /// segment lock is released but before this call returns.
    pub(crate) fn put(
        &self,
        key: K,
        value: V,
        version: Option<EntryVersion>,
        lifespan: Option<Duration>,
        max_idle: Option<Duration>,
        factory: &EntryFactory,
    ) {
        let mut evicted: EntryBatch<K, V> = HashMap::new();
        {
            let mut segment = self.segment_for(&key).lock();
            if let Some(existing) = segment.entries.get_mut(&key) {
                apply_write(existing, value, version, lifespan, max_idle, factory);
                segment.policy.record_access(&key);
            } else {
                while segment.entries.len() >= segment.capacity {
                    let victim = match segment.policy.select_victim() {
                        Some(victim) => victim,
                        None => match segment.entries.keys().next().cloned() {
                            Some(any) => {
                                segment.policy.record_removal(&any);
                                any
                            }
                            None => break,
                        },
                    };
                    if let Some(entry) = segment.entries.get(&victim) {
                        self.listener.on_entry_chosen_for_eviction(entry);
                    }
                    if let Some(entry) = segment.entries.remove(&victim) {
                        trace!(key = ?victim, "Evicted entry to make room");
                        evicted.insert(victim, entry);
                    }
                }
                let entry = factory.create(key.clone(), value, version, lifespan, max_idle);
                segment.entries.insert(key.clone(), entry);
                segment.policy.record_insert(&key);
            }
        }
        if !evicted.is_empty() {
            self.listener.on_entry_eviction(&evicted);
        }
    }

    /// Unconditional removal, expired or not.
    pub(crate) fn take(&self, key: &K) -> Option<CacheEntry<K, V>> {
        self.segment_for(key).lock().forget(key)
    }

    /// Removes the entry only if it is still expired at `now`.
    pub(crate) fn take_if_expired(&self, key: &K, now: u64) -> Option<CacheEntry<K, V>> {
        let mut segment = self.segment_for(key).lock();
        if !segment.entries.get(key)?.is_expired(now) {
            return None;
        }
        segment.forget(key)
    }

    /// Removal that hands the entry to `before` while it is still stored.
    pub(crate) fn remove_with<F>(&self, key: &K, before: F) -> Option<CacheEntry<K, V>>
    where
        F: FnOnce(&CacheEntry<K, V>),
    {
        let mut segment = self.segment_for(key).lock();
        before(segment.entries.get(key)?);
        segment.forget(key)
    }

    /// Removes every entry expired at `now`, one segment at a time.
    pub(crate) fn drain_expired(&self, now: u64) -> EntryBatch<K, V> {
        let mut purged = HashMap::new();
        for segment in self.segments.iter() {
            let mut segment = segment.lock();
            let expired: Vec<K> = segment
                .entries
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                if let Some(entry) = segment.forget(&key) {
                    purged.insert(key, entry);
                }
            }
        }
        purged
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.iter().map(|s| s.lock().entries.len()).sum()
    }

    pub(crate) fn clear(&self) {
        for segment in self.segments.iter() {
            let mut segment = segment.lock();
            segment.entries.clear();
            segment.policy.clear();
        }
    }

    pub(crate) fn iter(&self) -> SegmentIter<'_, K, V> {
        SegmentIter {
            map: self,
            next_segment: 0,
            buffer: Vec::new().into_iter(),
        }
    }
}

// == Segment Iterator ==
/// Walks the map one segment at a time, copying a segment's entries out
/// under its lock only when the previous segment is exhausted.
pub(crate) struct SegmentIter<'a, K, V> {
    map: &'a BoundedMap<K, V>,
    next_segment: usize,
    buffer: std::vec::IntoIter<CacheEntry<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Iterator for SegmentIter<'_, K, V> {
    type Item = CacheEntry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.next() {
                return Some(entry);
            }
            let segment = self.map.segments.get(self.next_segment)?;
            self.next_segment += 1;
            self.buffer = segment
                .lock()
                .entries
                .values()
                .cloned()
                .collect::<Vec<_>>()
                .into_iter();
        }
    }
}
