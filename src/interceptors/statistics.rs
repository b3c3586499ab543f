//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, stores,
//! removals, evictions and expirations.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::{Interceptor, Next};
use crate::commands::{
    ClearCommand, Command, EvictCommand, ExpireCommand, Flags, InvocationContext,
    PutKeyValueCommand, PutMapCommand, RemoveCommand, Visitor,
};
use crate::error::Result;
use crate::notifications::{CacheListener, EntriesEvictedEvent, EntriesExpiredEvent};
use crate::{CacheKey, CacheValue};

// == Cache Stats ==
/// Snapshot of the cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of values written
    pub stores: u64,
    /// Number of removals that found a live entry
    pub remove_hits: u64,
    /// Number of removals that found nothing to remove
    pub remove_misses: u64,
    /// Number of entries evicted
    pub evictions: u64,
    /// Number of entries expired
    pub expirations: u64,
    /// Hits over all retrievals, 0.0 before the first one
    pub hit_rate: f64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// == Statistics Interceptor ==
/// Counts command outcomes on their way back up the chain.
///
/// Evictions and expirations are counted from post-event notifications,
/// which cover both commands and the container's own eviction and purge.
/// Commands flagged `SKIP_STATISTICS` are not counted.
#[derive(Debug, Default)]
pub struct StatisticsInterceptor {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    remove_hits: AtomicU64,
    remove_misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl StatisticsInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            hits,
            misses,
            stores: self.stores.load(Ordering::Relaxed),
            remove_hits: self.remove_hits.load(Ordering::Relaxed),
            remove_misses: self.remove_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: CacheStats::hit_rate(hits, misses),
        }
    }

    // == Reset ==
    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.stores,
            &self.remove_hits,
            &self.remove_misses,
            &self.evictions,
            &self.expirations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl<K: CacheKey, V: CacheValue> Visitor<K, V> for StatisticsInterceptor {
    type Output = ();

    fn visit_put_key_value(&self, _ctx: &InvocationContext<K, V>, command: &PutKeyValueCommand<K, V>) {
        if command.is_successful() {
            self.stores.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn visit_put_map(&self, _ctx: &InvocationContext<K, V>, command: &PutMapCommand<K, V>) {
        if command.is_successful() {
            self.stores
                .fetch_add(command.map().len() as u64, Ordering::Relaxed);
        }
    }

    fn visit_remove(&self, _ctx: &InvocationContext<K, V>, command: &RemoveCommand<K, V>) {
        if command.is_successful() {
            self.remove_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.remove_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn visit_evict(&self, _ctx: &InvocationContext<K, V>, _command: &EvictCommand<K, V>) {}

    fn visit_expire(&self, _ctx: &InvocationContext<K, V>, _command: &ExpireCommand<K, V>) {}

    fn visit_clear(&self, _ctx: &InvocationContext<K, V>, _command: &ClearCommand<K, V>) {}
}

impl<K: CacheKey, V: CacheValue> Interceptor<K, V> for StatisticsInterceptor {
    fn name(&self) -> &str {
        "StatisticsInterceptor"
    }

    fn handle(
        &self,
        ctx: &mut InvocationContext<K, V>,
        command: &mut Command<K, V>,
        next: Next<'_, K, V>,
    ) -> Result<Option<V>> {
        let result = next.invoke(ctx, command)?;
        if !command.flags().contains(Flags::SKIP_STATISTICS) {
            command.accept_visitor(ctx, self);
        }
        Ok(result)
    }
}

impl<K, V> CacheListener<K, V> for StatisticsInterceptor {
    fn on_entries_evicted(&self, event: &EntriesEvictedEvent<'_, K, V>) {
        if !event.pre {
            self.evictions
                .fetch_add(event.entries.len() as u64, Ordering::Relaxed);
        }
    }

    fn on_entries_expired(&self, event: &EntriesExpiredEvent<'_, K, V>) {
        self.expirations
            .fetch_add(event.entries.len() as u64, Ordering::Relaxed);
    }
}
