//! Listener registry implementing [`CacheNotifier`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::{
    CacheListener, CacheNotifier, EntriesEvictedEvent, EntriesExpiredEvent, EntryModifiedEvent,
    EntryRemovedEvent,
};
use crate::commands::InvocationContext;

type Listeners<K, V> = Vec<Arc<dyn CacheListener<K, V>>>;

/// Dispatches every notification to each registered listener, in
/// registration order, on the calling thread.
pub struct ListenerNotifier<K, V> {
    listeners: RwLock<Listeners<K, V>>,
}

impl<K, V> ListenerNotifier<K, V> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    /// Unregisters a listener by identity. Returns true if it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn CacheListener<K, V>>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Snapshot so listeners run without the registry lock held.
    fn snapshot(&self) -> Listeners<K, V> {
        self.listeners.read().clone()
    }
}

impl<K, V> Default for ListenerNotifier<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheNotifier<K, V> for ListenerNotifier<K, V> {
    fn notify_entry_modified(
        &self,
        key: &K,
        value: Option<&V>,
        pre: bool,
        _ctx: &InvocationContext<K, V>,
    ) {
        let event = EntryModifiedEvent { key, value, pre };
        for listener in self.snapshot() {
            listener.on_entry_modified(&event);
        }
    }

    fn notify_entry_removed(&self, key: &K, value: Option<&V>, pre: bool, _ctx: &InvocationContext<K, V>) {
        let event = EntryRemovedEvent { key, value, pre };
        for listener in self.snapshot() {
            listener.on_entry_removed(&event);
        }
    }

    fn notify_entries_evicted(
        &self,
        entries: &HashMap<K, V>,
        pre: bool,
        _ctx: Option<&InvocationContext<K, V>>,
    ) {
        if entries.is_empty() {
            return;
        }
        trace!(count = entries.len(), pre, "Notifying evicted entries");
        let event = EntriesEvictedEvent { entries, pre };
        for listener in self.snapshot() {
            listener.on_entries_evicted(&event);
        }
    }

    fn notify_entries_expired(&self, entries: &HashMap<K, V>, _ctx: Option<&InvocationContext<K, V>>) {
        if entries.is_empty() {
            return;
        }
        trace!(count = entries.len(), "Notifying expired entries");
        let event = EntriesExpiredEvent { entries, pre: false };
        for listener in self.snapshot() {
            listener.on_entries_expired(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl CacheListener<String, i32> for Recorder {
        fn on_entry_modified(&self, event: &EntryModifiedEvent<'_, String, i32>) {
            self.seen
                .lock()
                .push(format!("modified:{}:{:?}:{}", event.key, event.value, event.pre));
        }

        fn on_entries_expired(&self, event: &EntriesExpiredEvent<'_, String, i32>) {
            let mut keys: Vec<_> = event.entries.keys().cloned().collect();
            keys.sort();
            self.seen.lock().push(format!("expired:{}", keys.join(",")));
        }
    }

    #[test]
    fn test_events_reach_listeners() {
        let notifier: ListenerNotifier<String, i32> = ListenerNotifier::new();
        let recorder = Arc::new(Recorder::default());
        notifier.add_listener(recorder.clone());

        let ctx = InvocationContext::new();
        notifier.notify_entry_modified(&"a".to_string(), Some(&1), false, &ctx);

        let expired: HashMap<String, i32> = [("x".to_string(), 1), ("y".to_string(), 2)].into();
        notifier.notify_entries_expired(&expired, None);

        let seen = recorder.seen.lock().clone();
        assert_eq!(seen, vec!["modified:a:Some(1):false", "expired:x,y"]);
    }

    #[test]
    fn test_empty_batches_are_not_delivered() {
        let notifier: ListenerNotifier<String, i32> = ListenerNotifier::new();
        let recorder = Arc::new(Recorder::default());
        notifier.add_listener(recorder.clone());

        notifier.notify_entries_expired(&HashMap::new(), None);
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn test_remove_listener() {
        let notifier: ListenerNotifier<String, i32> = ListenerNotifier::new();
        let listener: Arc<dyn CacheListener<String, i32>> = Arc::new(Recorder::default());
        notifier.add_listener(listener.clone());
        assert_eq!(notifier.listener_count(), 1);

        assert!(notifier.remove_listener(&listener));
        assert!(!notifier.remove_listener(&listener));
        assert_eq!(notifier.listener_count(), 0);
    }
}
