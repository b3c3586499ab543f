//! Entry Factory Module
//!
//! Creates and restamps entries, applying lifespan and max-idle settings.

use std::sync::Arc;
use std::time::Duration;

use crate::container::clock::{Clock, SystemClock};
use crate::container::entry::{CacheEntry, EntryVersion};

// == Entry Factory ==
/// Builds entries stamped with the time reported by its clock.
#[derive(Debug, Clone)]
pub struct EntryFactory {
    clock: Arc<dyn Clock>,
}

impl EntryFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Current time according to the factory's clock.
    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    // == Create ==
    /// Builds a brand-new entry stamped with the current time.
    pub fn create<K, V>(
        &self,
        key: K,
        value: V,
        version: Option<EntryVersion>,
        lifespan: Option<Duration>,
        max_idle: Option<Duration>,
    ) -> CacheEntry<K, V> {
        CacheEntry::new(key, value, version, lifespan, max_idle, self.now())
    }

    // == Update ==
    /// Restamps an entry whose value and version were already replaced in place.
    ///
    /// Returns `true` when the slot had already expired before this write
    /// landed, i.e. the write starts a new generation of the slot. The
    /// caller is responsible for bumping the reincarnation counter.
    pub fn update<K, V>(
        &self,
        entry: &mut CacheEntry<K, V>,
        lifespan: Option<Duration>,
        max_idle: Option<Duration>,
    ) -> bool {
        let now = self.now();
        let reincarnated = entry.is_expired(now);
        entry.renew(lifespan, max_idle, now);
        reincarnated
    }
}

impl Default for EntryFactory {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::clock::ManualClock;

    fn factory_at(start: u64) -> (EntryFactory, ManualClock) {
        let clock = ManualClock::new(start);
        (EntryFactory::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_create_stamps_current_time() {
        let (factory, _clock) = factory_at(42);
        let entry = factory.create("k", 1, Some(EntryVersion(3)), None, None);

        assert_eq!(entry.created(), 42);
        assert_eq!(entry.last_used(), 42);
        assert_eq!(entry.version(), Some(EntryVersion(3)));
        assert_eq!(entry.reincarnations(), 0);
    }

    #[test]
    fn test_update_live_entry_is_not_reincarnation() {
        let (factory, clock) = factory_at(0);
        let mut entry = factory.create("k", 1, None, Some(Duration::from_millis(100)), None);

        clock.advance(Duration::from_millis(60));
        let reincarnated = factory.update(&mut entry, Some(Duration::from_millis(100)), None);

        assert!(!reincarnated);
        assert_eq!(entry.created(), 60);
    }

    #[test]
    fn test_update_expired_entry_is_reincarnation() {
        let (factory, clock) = factory_at(0);
        let mut entry = factory.create("k", 1, None, Some(Duration::from_millis(1)), None);

        clock.advance(Duration::from_millis(5));
        let reincarnated = factory.update(&mut entry, None, Some(Duration::from_millis(30)));

        assert!(reincarnated);
        assert!(!entry.is_expired(5));
        assert_eq!(entry.lifespan(), None);
        assert_eq!(entry.max_idle(), Some(Duration::from_millis(30)));
    }
}
