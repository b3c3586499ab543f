//! Integration Tests for the Cache Facade
//!
//! Exercises the container, command pipeline, listeners and interceptors
//! together through the public API.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use cache_core::commands::{
    Command, ExpireCommand, InvocationContext, RemoveCommand, LOCAL_ONLY_COMMAND_ID,
};
use cache_core::container::{CacheEntry, EvictionStrategy, ManualClock, Passivator};
use cache_core::interceptors::{EstimateSize, HeapSizeEstimator, Interceptor, Next, TrackingType};
use cache_core::notifications::{
    CacheListener, EntriesEvictedEvent, EntriesExpiredEvent, EntryRemovedEvent,
};
use cache_core::{Cache, CacheError, Config, Flags};

// == Helper Functions ==

type Log = Arc<Mutex<Vec<String>>>;

struct LoggingPassivator(Log);

impl Passivator<String, String> for LoggingPassivator {
    fn passivate(&self, entry: &CacheEntry<String, String>) {
        self.0.lock().push(format!("passivate:{}", entry.key()));
    }
}

struct LoggingListener(Log);

impl CacheListener<String, String> for LoggingListener {
    fn on_entry_removed(&self, event: &EntryRemovedEvent<'_, String, String>) {
        if !event.pre {
            self.0.lock().push(format!("removed:{}", event.key));
        }
    }

    fn on_entries_evicted(&self, event: &EntriesEvictedEvent<'_, String, String>) {
        if !event.pre {
            let mut keys: Vec<_> = event.entries.keys().cloned().collect();
            keys.sort();
            self.0.lock().push(format!("evicted:{}", keys.join(",")));
        }
    }

    fn on_entries_expired(&self, event: &EntriesExpiredEvent<'_, String, String>) {
        let mut keys: Vec<_> = event.entries.keys().cloned().collect();
        keys.sort();
        self.0.lock().push(format!("expired:{}", keys.join(",")));
    }
}

fn bounded(max_entries: usize) -> Config {
    Config {
        max_entries,
        concurrency_level: 1,
        ..Config::default()
    }
}

fn create_cache(mut config: Config) -> (Cache<String, String>, ManualClock, Log) {
    config.track_memory_usage = true;
    let clock = ManualClock::new(1_000);
    let log: Log = Arc::default();
    let cache = Cache::builder(config)
        .clock(Arc::new(clock.clone()))
        .passivator(Arc::new(LoggingPassivator(log.clone())))
        .size_estimator(Arc::new(HeapSizeEstimator))
        .build()
        .unwrap();
    cache.add_listener(Arc::new(LoggingListener(log.clone())));
    (cache, clock, log)
}

fn key(k: &str) -> String {
    k.to_string()
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Writes a fresh value for the key of any Expire command before it runs,
/// as a writer racing a stale read would.
struct RenewBeforeExpire;

impl Interceptor<String, String> for RenewBeforeExpire {
    fn name(&self) -> &str {
        "RenewBeforeExpire"
    }

    fn handle(
        &self,
        ctx: &mut InvocationContext<String, String>,
        command: &mut Command<String, String>,
        next: Next<'_, String, String>,
    ) -> cache_core::Result<Option<String>> {
        if let Command::Expire(expire) = &*command {
            if let Some(k) = expire.key() {
                next.container().put(k.clone(), key("fresh"), None, None, None);
            }
        }
        next.invoke(ctx, command)
    }
}

/// Drops a just-written key behind the pipeline's back, as a concurrent
/// eviction whose event was already handled would.
struct DropAfterWrite;

impl Interceptor<String, String> for DropAfterWrite {
    fn name(&self) -> &str {
        "DropAfterWrite"
    }

    fn handle(
        &self,
        ctx: &mut InvocationContext<String, String>,
        command: &mut Command<String, String>,
        next: Next<'_, String, String>,
    ) -> cache_core::Result<Option<String>> {
        let container = next.container();
        let result = next.invoke(ctx, command)?;
        if let Command::PutKeyValue(put) = &*command {
            container.remove(put.key());
        }
        Ok(result)
    }
}

/// Every key reported expired so far, one item per report.
fn expired_keys(log: &Log) -> Vec<String> {
    log.lock()
        .iter()
        .filter_map(|line| line.strip_prefix("expired:"))
        .flat_map(|keys| keys.split(',').map(str::to_string).collect::<Vec<_>>())
        .collect()
}

// == Expiration ==

#[test]
fn test_expired_entry_is_removed_lazily() {
    let (cache, clock, log) = create_cache(Config::default());
    cache
        .put_with(key("a"), key("1"), Some(Duration::from_millis(100)), None)
        .unwrap();

    clock.advance(Duration::from_millis(100));
    assert_eq!(cache.get(&key("a")), Some(key("1")), "expiry is strictly after the limit");

    clock.advance(Duration::from_millis(1));
    assert_eq!(cache.size(), 1, "nothing sweeps without a read or purge");
    assert_eq!(cache.get(&key("a")), None);
    assert_eq!(cache.size(), 0);
    assert_eq!(*log.lock(), vec!["expired:a"]);
}

#[test]
fn test_stale_read_does_not_expire_a_renewed_entry() {
    let (cache, clock, log) = create_cache(Config::default());
    cache.add_interceptor(Arc::new(RenewBeforeExpire));
    cache.put_with(key("k"), key("old"), Some(ms(10)), None).unwrap();
    clock.advance(ms(11));

    assert_eq!(cache.get(&key("k")), None, "the read itself saw the entry expired");
    assert_eq!(cache.peek(&key("k")).map(CacheEntry::into_value), Some(key("fresh")));
    assert_eq!(cache.get(&key("k")), Some(key("fresh")));
    assert!(expired_keys(&log).is_empty());
    assert_eq!(cache.stats().unwrap().expirations, 0);
}

#[test]
fn test_huge_lifespan_does_not_expire_early() {
    let (cache, clock, _) = create_cache(Config::default());
    cache
        .put_with(key("a"), key("1"), Some(Duration::from_secs(1 << 62)), None)
        .unwrap();
    cache.put_with(key("b"), key("2"), Some(Duration::MAX), Some(Duration::MAX)).unwrap();

    clock.advance(ms(1));
    assert_eq!(cache.get(&key("a")), Some(key("1")));
    assert_eq!(cache.get(&key("b")), Some(key("2")));
    assert_eq!(cache.peek(&key("b")).unwrap().ttl_remaining_ms(0), Some(u64::MAX - 1));
}

#[test]
fn test_max_idle_is_refreshed_by_reads() {
    let (cache, clock, _) = create_cache(Config::default());
    cache
        .put_with(key("a"), key("1"), None, Some(Duration::from_millis(50)))
        .unwrap();

    for _ in 0..5 {
        clock.advance(Duration::from_millis(40));
        assert!(cache.get(&key("a")).is_some());
    }

    clock.advance(Duration::from_millis(51));
    assert!(cache.get(&key("a")).is_none());
}

#[test]
fn test_purge_reports_one_batch_and_leaves_live_entries_untouched() {
    let (cache, clock, log) = create_cache(Config::default());
    for k in ["e1", "e2", "e3"] {
        cache
            .put_with(key(k), key(k), Some(Duration::from_millis(10)), None)
            .unwrap();
    }
    for k in ["l1", "l2"] {
        cache.put(key(k), key(k)).unwrap();
    }
    let before: HashMap<String, u64> = ["l1", "l2"]
        .iter()
        .map(|k| (key(k), cache.peek(&key(k)).unwrap().last_used()))
        .collect();

    clock.advance(Duration::from_millis(20));
    assert_eq!(cache.purge_expired(), 3);

    assert_eq!(*log.lock(), vec!["expired:e1,e2,e3"]);
    assert_eq!(cache.size(), 2);
    for (k, last_used) in before {
        assert_eq!(cache.peek(&k).unwrap().last_used(), last_used);
    }
    assert_eq!(cache.stats().unwrap().expirations, 3);
    assert_eq!(cache.memory_interceptor().unwrap().tracked_keys(), 2);
}

#[test]
fn test_purge_racing_reads_reports_each_key_once() {
    let (cache, clock, log) = create_cache(Config::default());
    let keys: Vec<String> = (0..200).map(|i| format!("k{}", i)).collect();
    for k in &keys {
        cache.put_with(k.clone(), k.clone(), Some(ms(10)), None).unwrap();
    }
    clock.advance(ms(11));

    thread::scope(|scope| {
        for _ in 0..2 {
            scope.spawn(|| cache.purge_expired());
        }
        for t in 0..4 {
            let keys = &keys;
            let cache = &cache;
            scope.spawn(move || {
                for k in keys.iter().skip(t * 7) {
                    assert_eq!(cache.get(k), None);
                }
            });
        }
    });

    let mut reported = expired_keys(&log);
    reported.sort();
    let total = reported.len();
    reported.dedup();
    assert_eq!(total, 200, "every key reported exactly once");
    assert_eq!(reported.len(), 200);
    assert_eq!(cache.size(), 0);
    assert_eq!(cache.stats().unwrap().expirations, 200);
    assert_eq!(cache.memory_usage().unwrap().tracked_keys, 0);
}

// == Bounded Container ==

#[test]
fn test_bounded_cache_never_exceeds_capacity() {
    let (cache, _, _) = create_cache(bounded(8));
    for i in 0..100 {
        cache.put(format!("k{}", i), format!("v{}", i)).unwrap();
        assert!(cache.size() <= 8);
    }
    assert_eq!(cache.size(), 8);
    assert_eq!(cache.stats().unwrap().evictions, 92);
}

#[test]
fn test_concurrent_writers_never_exceed_capacity() {
    let config = Config {
        max_entries: 32,
        concurrency_level: 4,
        ..Config::default()
    };
    let (cache, _, _) = create_cache(config);

    thread::scope(|scope| {
        for t in 0..8 {
            let cache = &cache;
            scope.spawn(move || {
                for i in 0..500 {
                    cache.put(format!("t{}-k{}", t, i), key("v")).unwrap();
                    assert!(cache.size() <= 32);
                }
            });
        }
    });

    assert!(cache.size() <= 32);
    let evictions = cache.stats().unwrap().evictions as usize;
    assert_eq!(evictions + cache.size(), 8 * 500);
    let report = cache.memory_usage().unwrap();
    assert_eq!(report.tracked_keys, cache.size());
}

#[test]
fn test_victim_is_passivated_before_eviction_is_reported() {
    let (cache, _, log) = create_cache(bounded(2));
    cache.put(key("a"), key("1")).unwrap();
    cache.put(key("b"), key("2")).unwrap();
    cache.get(&key("a"));
    cache.put(key("c"), key("3")).unwrap();

    assert_eq!(*log.lock(), vec!["passivate:b", "evicted:b"]);
    assert!(cache.contains_key(&key("a")));
    assert!(!cache.contains_key(&key("b")));
}

#[test]
fn test_lirs_strategy_keeps_capacity() {
    let config = Config {
        eviction_strategy: EvictionStrategy::Lirs,
        ..bounded(16)
    };
    let (cache, _, _) = create_cache(config);
    for i in 0..200 {
        cache.put(format!("k{}", i % 40), format!("v{}", i)).unwrap();
        cache.get(&format!("k{}", i % 5));
    }
    assert!(cache.size() <= 16);
}

#[test]
fn test_explicit_evict_passivates_then_reports() {
    let (cache, _, log) = create_cache(Config::default());
    cache.put(key("a"), key("1")).unwrap();
    assert!(cache.evict(&key("a")).unwrap());
    assert!(!cache.evict(&key("a")).unwrap());
    assert_eq!(*log.lock(), vec!["passivate:a", "evicted:a"]);
    assert_eq!(cache.size(), 0);
}

// == Writes ==

#[test]
fn test_put_after_expiry_reincarnates_entry() {
    let (cache, clock, _) = create_cache(Config::default());
    cache
        .put_with(key("a"), key("1"), Some(Duration::from_millis(10)), None)
        .unwrap();
    assert_eq!(cache.peek(&key("a")).unwrap().reincarnations(), 0);

    clock.advance(Duration::from_millis(20));
    let previous = cache
        .put_with(key("a"), key("2"), Some(Duration::from_millis(10)), None)
        .unwrap();

    assert_eq!(previous, None, "an expired value is never returned");
    let entry = cache.peek(&key("a")).unwrap();
    assert_eq!(entry.reincarnations(), 1);
    assert_eq!(entry.created(), 1_020);
    assert_eq!(cache.get(&key("a")), Some(key("2")));
}

#[test]
fn test_put_all_and_clear() {
    let (cache, _, log) = create_cache(Config::default());
    let entries: HashMap<String, String> =
        (0..5).map(|i| (format!("k{}", i), format!("v{}", i))).collect();
    cache.put_all(entries).unwrap();
    assert_eq!(cache.size(), 5);
    assert_eq!(cache.stats().unwrap().stores, 5);

    cache.clear().unwrap();
    assert!(cache.is_empty());
    assert_eq!(log.lock().iter().filter(|l| l.starts_with("removed:")).count(), 5);
    assert_eq!(cache.memory_usage().unwrap().total, 0);
}

// == Commands ==

#[test]
fn test_expire_command_is_local_only() {
    let command: Command<String, String> = ExpireCommand::new(key("a")).into();
    assert_eq!(command.command_id(), LOCAL_ONLY_COMMAND_ID);
    assert!(!command.is_replicable());
}

#[test]
fn test_expire_without_key_is_rejected() {
    let (cache, _, _) = create_cache(Config::default());
    let mut command: Command<String, String> = ExpireCommand::for_key(None).into();
    assert!(matches!(
        cache.invoke(&mut command),
        Err(CacheError::ContractViolation(_))
    ));
}

// == Memory Usage ==

#[test]
fn test_memory_usage_tracks_writes_removals_and_evictions() {
    let (cache, _, _) = create_cache(bounded(3));
    for i in 0..3 {
        cache.put(format!("k{}", i), "x".repeat(100)).unwrap();
    }
    let full = cache.memory_usage().unwrap();
    assert_eq!(full.tracking_type, TrackingType::ObjectSize);
    assert_eq!(full.tracked_keys, 3);
    assert!(full.total >= 300);

    // Capacity eviction reaches the interceptor through the eviction event
    cache.put(key("k3"), "x".repeat(100)).unwrap();
    assert_eq!(cache.memory_usage().unwrap().total, full.total);

    cache.remove(&key("k3")).unwrap();
    let after = cache.memory_usage().unwrap();
    assert_eq!(after.tracked_keys, 2);
    assert!(after.total < full.total);
}

#[test]
fn test_removing_expired_entry_untracks_it_without_notifications() {
    let (cache, clock, log) = create_cache(Config::default());
    cache.put_with(key("k"), key("v"), Some(ms(10)), None).unwrap();
    clock.advance(ms(11));

    let mut command: Command<String, String> = RemoveCommand::new(key("k"))
        .with_flags(Flags::SKIP_LISTENER_NOTIFICATION)
        .into();
    assert_eq!(cache.invoke(&mut command).unwrap(), None);
    assert!(!command.is_successful());

    assert_eq!(cache.size(), 0);
    assert!(log.lock().is_empty());
    let report = cache.memory_usage().unwrap();
    assert_eq!(report.tracked_keys, 0);
    assert_eq!(report.total, 0);
}

#[test]
fn test_memory_usage_skips_key_dropped_before_post_hook() {
    let (cache, _, _) = create_cache(Config::default());
    cache.add_interceptor(Arc::new(DropAfterWrite));

    cache.put(key("a"), key("1")).unwrap();
    assert_eq!(cache.size(), 0);
    let report = cache.memory_usage().unwrap();
    assert_eq!(report.tracked_keys, 0);
    assert_eq!(report.total, 0);
}

#[test]
fn test_memory_usage_converges_under_concurrent_writers() {
    let (cache, _, _) = create_cache(Config::unbounded());
    let cache = Arc::new(cache);

    thread::scope(|scope| {
        for t in 0..4 {
            let cache = cache.clone();
            scope.spawn(move || {
                for i in 0..200 {
                    // Each writer owns its keys; same-key races are only eventually consistent
                    let k = format!("t{}-k{}", t, i % 50);
                    if (i + t) % 3 == 0 {
                        cache.remove(&k).unwrap();
                    } else {
                        cache.put(k, "v".repeat(i % 7 + 1)).unwrap();
                    }
                }
            });
        }
    });

    let expected: u64 = cache
        .container()
        .values()
        .iter()
        .map(|v| v.estimate_size())
        .sum();
    let report = cache.memory_usage().unwrap();
    assert_eq!(report.tracked_keys, cache.size());
    assert_eq!(report.total, expected);
}

// == Views ==

#[test]
fn test_views_are_read_only() {
    let (cache, _, _) = create_cache(Config::default());
    cache.put(key("a"), key("1")).unwrap();
    let container = cache.container();

    assert!(container.key_set().contains(&key("a")));
    assert!(container.values().contains(&key("1")));
    assert_eq!(container.entry_set().len(), 1);

    assert!(matches!(
        container.key_set().insert(key("b")),
        Err(CacheError::Unsupported(_))
    ));
    assert!(container.values().clear().is_err());
    assert!(container.entry_set().remove(&key("a")).is_err());
    assert_eq!(cache.size(), 1);
}

// == Statistics ==

#[test]
fn test_statistics_snapshot() {
    let (cache, _, _) = create_cache(Config::default());
    cache.put(key("a"), key("1")).unwrap();
    cache.get(&key("a"));
    cache.get(&key("missing"));
    cache.remove(&key("missing")).unwrap();

    let stats = cache.stats().unwrap();
    assert_eq!(stats.stores, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.remove_misses, 1);
    assert_eq!(stats.hit_rate, 0.5);
}
