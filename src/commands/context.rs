//! Invocation Context
//!
//! Per-operation scratch space carried through the whole interceptor chain.

use std::collections::HashMap;
use std::hash::Hash;

use crate::container::CacheEntry;

/// Entries a command looked up, keyed by cache key.
///
/// Created for one top-level operation and dropped when that operation's
/// traversal of the chain completes. Downstream interceptors read the
/// looked-up entries instead of querying the container again, e.g. to
/// report the value a key held before it was mutated.
#[derive(Debug)]
pub struct InvocationContext<K, V> {
    looked_up: HashMap<K, CacheEntry<K, V>>,
    /// Set while the context is traversing a chain
    in_flight: bool,
}

impl<K, V> InvocationContext<K, V> {
    pub fn new() -> Self {
        Self {
            looked_up: HashMap::new(),
            in_flight: false,
        }
    }

    pub fn looked_up_entries(&self) -> &HashMap<K, CacheEntry<K, V>> {
        &self.looked_up
    }

    pub fn clear_looked_up_entries(&mut self) {
        self.looked_up.clear();
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }
}

impl<K: Eq + Hash, V> InvocationContext<K, V> {
    pub fn lookup_entry(&self, key: &K) -> Option<&CacheEntry<K, V>> {
        self.looked_up.get(key)
    }

    pub fn put_looked_up_entry(&mut self, key: K, entry: CacheEntry<K, V>) {
        self.looked_up.insert(key, entry);
    }

    pub fn remove_looked_up_entry(&mut self, key: &K) -> Option<CacheEntry<K, V>> {
        self.looked_up.remove(key)
    }
}

impl<K, V> Default for InvocationContext<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
