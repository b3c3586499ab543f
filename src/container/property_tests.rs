//! Property-Based Tests for the Container Module
//!
//! Uses proptest to check container invariants over random operation sequences.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::container::{
    Collaborators, DataContainer, EntryBatch, EntryFactory, EvictionManager, EvictionStrategy,
    EvictionThreadPolicy, ManualClock,
};

// == Test Fixtures ==
#[derive(Default)]
struct CountingManager {
    evicted: AtomicUsize,
    expired: AtomicUsize,
    expiry_batches: AtomicUsize,
}

impl EvictionManager<String, String> for CountingManager {
    fn on_entry_eviction(&self, evicted: &EntryBatch<String, String>) {
        self.evicted.fetch_add(evicted.len(), Ordering::SeqCst);
    }

    fn on_entry_expiration(&self, expired: &EntryBatch<String, String>) {
        self.expired.fetch_add(expired.len(), Ordering::SeqCst);
        self.expiry_batches.fetch_add(1, Ordering::SeqCst);
    }
}

fn collaborators(manager: Arc<CountingManager>, clock: &ManualClock) -> Collaborators<String, String> {
    Collaborators::new(manager).with_entry_factory(EntryFactory::new(Arc::new(clock.clone())))
}

fn bounded(
    max_entries: usize,
    concurrency: usize,
    strategy: EvictionStrategy,
) -> (DataContainer<String, String>, Arc<CountingManager>) {
    let manager = Arc::new(CountingManager::default());
    let container = DataContainer::bounded(
        concurrency,
        max_entries,
        strategy,
        EvictionThreadPolicy::Piggyback,
        collaborators(manager.clone(), &ManualClock::new(0)),
    )
    .unwrap();
    (container, manager)
}

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,32}"
}

fn strategy_strategy() -> impl Strategy<Value = EvictionStrategy> {
    prop_oneof![
        Just(EvictionStrategy::Fifo),
        Just(EvictionStrategy::Unordered),
        Just(EvictionStrategy::Lru),
        Just(EvictionStrategy::Lirs),
    ]
}

#[derive(Debug, Clone)]
enum ContainerOp {
    Put { key: String, value: String },
    Get { key: String },
    Remove { key: String },
}

fn container_op_strategy() -> impl Strategy<Value = ContainerOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(key, value)| ContainerOp::Put { key, value }),
        1 => key_strategy().prop_map(|key| ContainerOp::Get { key }),
        1 => key_strategy().prop_map(|key| ContainerOp::Remove { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // A bounded container never holds more than its limit, whatever the
    // strategy or segment layout.
    #[test]
    fn prop_bounded_size_never_exceeds_max(
        max_entries in 1usize..40,
        concurrency in 1usize..32,
        strategy in strategy_strategy(),
        ops in prop::collection::vec(container_op_strategy(), 1..300)
    ) {
        let (container, _) = bounded(max_entries, concurrency, strategy);

        for op in ops {
            match op {
                ContainerOp::Put { key, value } => container.put(key, value, None, None, None),
                ContainerOp::Get { key } => { container.get(&key); }
                ContainerOp::Remove { key } => { container.remove(&key); }
            }
            prop_assert!(
                container.size() <= max_entries,
                "Container size {} exceeds max {}",
                container.size(),
                max_entries
            );
        }
    }

    // Without removals, every inserted entry is either still stored or was
    // reported evicted exactly once.
    #[test]
    fn prop_evictions_account_for_every_key(
        max_entries in 1usize..20,
        strategy in strategy_strategy(),
        keys in prop::collection::vec(key_strategy(), 1..200)
    ) {
        let (container, manager) = bounded(max_entries, 4, strategy);
        let distinct: HashSet<_> = keys.iter().cloned().collect();
        let mut inserts = 0;

        for key in keys {
            if !container.contains_key(&key) {
                container.put(key, String::new(), None, None, None);
                inserts += 1;
            }
        }

        let evicted = manager.evicted.load(Ordering::SeqCst);
        prop_assert_eq!(container.size() + evicted, inserts);
        prop_assert!(inserts >= distinct.len());
    }

    // Writing twice to one key leaves one entry holding the second value.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        value1 in value_strategy(),
        value2 in value_strategy()
    ) {
        let manager = Arc::new(CountingManager::default());
        let container = DataContainer::unbounded(4, collaborators(manager, &ManualClock::new(0)));

        container.put(key.clone(), value1, None, None, None);
        container.put(key.clone(), value2.clone(), None, None, None);

        let entry = container.get(&key).unwrap();
        prop_assert_eq!(entry.value(), &value2);
        prop_assert_eq!(entry.reincarnations(), 0);
        prop_assert_eq!(container.size(), 1);
    }

    // In a single LRU segment the least recently touched key is the victim.
    #[test]
    fn prop_lru_evicts_least_recently_used(
        keys in prop::collection::hash_set(key_strategy(), 3..10),
        touched in 0usize..100,
        new_key in key_strategy()
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        prop_assume!(!keys.contains(&new_key));

        let capacity = keys.len();
        let (container, _) = bounded(capacity, 1, EvictionStrategy::Lru);
        for key in &keys {
            container.put(key.clone(), format!("value_{}", key), None, None, None);
        }

        // Touch one key; the oldest of the rest becomes the victim
        let touched = keys[touched % capacity].clone();
        container.get(&touched);
        let victim = keys.iter().find(|k| **k != touched).unwrap().clone();

        container.put(new_key.clone(), String::new(), None, None, None);

        prop_assert_eq!(container.size(), capacity);
        prop_assert!(container.contains_key(&touched));
        prop_assert!(container.contains_key(&new_key));
        prop_assert!(!container.contains_key(&victim), "Key '{}' should have been evicted", victim);
    }

    // A sweep removes exactly the expired entries, reports them in one
    // batch and leaves the rest alone.
    #[test]
    fn prop_purge_removes_exactly_expired(
        lifespans in prop::collection::hash_map(key_strategy(), prop::option::of(1u64..100), 1..50),
        elapsed in 0u64..120,
        bounded_flavor in any::<bool>()
    ) {
        let clock = ManualClock::new(10_000);
        let manager = Arc::new(CountingManager::default());
        let container = if bounded_flavor {
            DataContainer::bounded(
                8,
                1024,
                EvictionStrategy::Lru,
                EvictionThreadPolicy::Default,
                collaborators(manager.clone(), &clock),
            )
            .unwrap()
        } else {
            DataContainer::unbounded(8, collaborators(manager.clone(), &clock))
        };

        for (key, lifespan) in &lifespans {
            container.put(key.clone(), String::new(), None, lifespan.map(Duration::from_millis), None);
        }
        clock.advance(Duration::from_millis(elapsed));

        let expected = lifespans
            .values()
            .filter(|l| matches!(l, Some(ms) if elapsed > *ms))
            .count();

        prop_assert_eq!(container.purge_expired(), expected);
        prop_assert_eq!(container.size(), lifespans.len() - expected);
        prop_assert_eq!(manager.expired.load(Ordering::SeqCst), expected);
        prop_assert_eq!(manager.expiry_batches.load(Ordering::SeqCst), usize::from(expected > 0));
    }
}
