//! Eviction Collaborators
//!
//! Callbacks the container fires when entries are evicted for capacity or
//! swept for expiry, and the passivation hook that runs before an evicted
//! entry is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::container::entry::CacheEntry;
use crate::notifications::CacheNotifier;

/// Immutable batch of removed entries, keyed by cache key.
pub type EntryBatch<K, V> = HashMap<K, CacheEntry<K, V>>;

// == Eviction Listener ==
/// Callback pair a bounded map fires around a capacity eviction.
pub trait EvictionListener<K, V>: Send + Sync {
    /// Runs before the victim is removed, while it is still stored.
    fn on_entry_chosen_for_eviction(&self, entry: &CacheEntry<K, V>);

    /// Runs after the victims were removed.
    fn on_entry_eviction(&self, evicted: &EntryBatch<K, V>);
}

// == Eviction Manager ==
/// Receives batches of evicted and expired entries from the container.
pub trait EvictionManager<K, V>: Send + Sync {
    fn on_entry_eviction(&self, evicted: &EntryBatch<K, V>);

    fn on_entry_expiration(&self, expired: &EntryBatch<K, V>);
}

// == Passivator ==
/// Persists an entry's value to a backing store before it leaves memory.
pub trait Passivator<K, V>: Send + Sync {
    fn passivate(&self, entry: &CacheEntry<K, V>);
}

/// Passivator for caches without a backing store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPassivator;

impl<K, V> Passivator<K, V> for NoopPassivator {
    fn passivate(&self, _entry: &CacheEntry<K, V>) {}
}

// == Notifying Eviction Manager ==
/// Eviction manager that reports every batch through the cache notifier.
pub struct NotifyingEvictionManager<K, V> {
    notifier: Arc<dyn CacheNotifier<K, V>>,
}

impl<K, V> NotifyingEvictionManager<K, V> {
    pub fn new(notifier: Arc<dyn CacheNotifier<K, V>>) -> Self {
        Self { notifier }
    }
}

fn values_of<K: Clone + Eq + std::hash::Hash, V: Clone>(batch: &EntryBatch<K, V>) -> HashMap<K, V> {
    batch
        .iter()
        .map(|(k, e)| (k.clone(), e.value().clone()))
        .collect()
}

impl<K, V> EvictionManager<K, V> for NotifyingEvictionManager<K, V>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn on_entry_eviction(&self, evicted: &EntryBatch<K, V>) {
        let entries = values_of(evicted);
        self.notifier.notify_entries_evicted(&entries, true, None);
        self.notifier.notify_entries_evicted(&entries, false, None);
    }

    fn on_entry_expiration(&self, expired: &EntryBatch<K, V>) {
        self.notifier.notify_entries_expired(&values_of(expired), None);
    }
}

// == Container Eviction Listener ==
/// Wires a bounded map's callbacks to the passivator and eviction manager.
pub(crate) struct ContainerEvictionListener<K, V> {
    eviction_manager: Arc<dyn EvictionManager<K, V>>,
    passivator: Arc<dyn Passivator<K, V>>,
}

impl<K, V> ContainerEvictionListener<K, V> {
    pub(crate) fn new(
        eviction_manager: Arc<dyn EvictionManager<K, V>>,
        passivator: Arc<dyn Passivator<K, V>>,
    ) -> Self {
        Self {
            eviction_manager,
            passivator,
        }
    }
}

impl<K: std::fmt::Debug, V> EvictionListener<K, V> for ContainerEvictionListener<K, V> {
    fn on_entry_chosen_for_eviction(&self, entry: &CacheEntry<K, V>) {
        trace!(key = ?entry.key(), "Passivating entry chosen for eviction");
        self.passivator.passivate(entry);
    }

    fn on_entry_eviction(&self, evicted: &EntryBatch<K, V>) {
        self.eviction_manager.on_entry_eviction(evicted);
    }
}
