//! Notifications Module
//!
//! Change notification for entries written, removed, evicted or expired.
//! Commands and the eviction manager talk to a [`CacheNotifier`]; the
//! bundled [`ListenerNotifier`] fans events out to registered
//! [`CacheListener`]s.

mod notifier;

use std::collections::HashMap;

use crate::commands::InvocationContext;

pub use notifier::ListenerNotifier;

// == Events ==
/// A single entry is being (pre) or was (post) created or overwritten.
#[derive(Debug)]
pub struct EntryModifiedEvent<'a, K, V> {
    pub key: &'a K,
    /// Previous value when `pre`, new value otherwise
    pub value: Option<&'a V>,
    pub pre: bool,
}

/// A single entry is being (pre) or was (post) removed.
#[derive(Debug)]
pub struct EntryRemovedEvent<'a, K, V> {
    pub key: &'a K,
    pub value: Option<&'a V>,
    pub pre: bool,
}

/// A batch of entries is being (pre) or was (post) evicted.
#[derive(Debug)]
pub struct EntriesEvictedEvent<'a, K, V> {
    pub entries: &'a HashMap<K, V>,
    pub pre: bool,
}

/// A batch of entries expired. Expiration is only ever reported after the fact.
#[derive(Debug)]
pub struct EntriesExpiredEvent<'a, K, V> {
    pub entries: &'a HashMap<K, V>,
    pub pre: bool,
}

// == Cache Listener ==
/// Receiver of cache events. Every handler defaults to doing nothing.
pub trait CacheListener<K, V>: Send + Sync {
    fn on_entry_modified(&self, _event: &EntryModifiedEvent<'_, K, V>) {}

    fn on_entry_removed(&self, _event: &EntryRemovedEvent<'_, K, V>) {}

    fn on_entries_evicted(&self, _event: &EntriesEvictedEvent<'_, K, V>) {}

    fn on_entries_expired(&self, _event: &EntriesExpiredEvent<'_, K, V>) {}
}

// == Cache Notifier ==
/// Notification collaborator invoked by commands and by the container's
/// eviction and expiration paths.
pub trait CacheNotifier<K, V>: Send + Sync {
    fn notify_entry_modified(
        &self,
        key: &K,
        value: Option<&V>,
        pre: bool,
        ctx: &InvocationContext<K, V>,
    );

    fn notify_entry_removed(&self, key: &K, value: Option<&V>, pre: bool, ctx: &InvocationContext<K, V>);

    fn notify_entries_evicted(
        &self,
        entries: &HashMap<K, V>,
        pre: bool,
        ctx: Option<&InvocationContext<K, V>>,
    );

    fn notify_entries_expired(&self, entries: &HashMap<K, V>, ctx: Option<&InvocationContext<K, V>>);
}
