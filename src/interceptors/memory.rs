//! Memory Usage Interceptor
//!
//! Keeps a running estimate of the memory held by live values, in total and
//! per value type. Sizes come from a [`SizeEstimator`]; when it cannot
//! measure a value the interceptor degrades to counting objects instead.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{Interceptor, Next};
use crate::commands::{
    ClearCommand, Command, EvictCommand, ExpireCommand, InvocationContext, PutKeyValueCommand,
    PutMapCommand, RemoveCommand, Visitor,
};
use crate::container::DataContainer;
use crate::error::{MeasureError, Result};
use crate::notifications::{CacheListener, EntriesEvictedEvent, EntriesExpiredEvent};
use crate::{CacheKey, CacheValue};

// == Size Estimation ==
/// Approximate number of bytes a value occupies, heap included.
pub trait EstimateSize {
    fn estimate_size(&self) -> u64;
}

macro_rules! fixed_size {
    ($($t:ty),* $(,)?) => {
        $(
            impl EstimateSize for $t {
                fn estimate_size(&self) -> u64 {
                    mem::size_of::<$t>() as u64
                }
            }
        )*
    };
}

fixed_size!(bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

impl EstimateSize for String {
    fn estimate_size(&self) -> u64 {
        (mem::size_of::<String>() + self.capacity()) as u64
    }
}

impl EstimateSize for &'static str {
    fn estimate_size(&self) -> u64 {
        (mem::size_of::<&str>() + self.len()) as u64
    }
}

impl<T: EstimateSize> EstimateSize for Vec<T> {
    fn estimate_size(&self) -> u64 {
        let spare = (self.capacity() - self.len()) * mem::size_of::<T>();
        let items: u64 = self.iter().map(EstimateSize::estimate_size).sum();
        (mem::size_of::<Vec<T>>() + spare) as u64 + items
    }
}

impl<T: EstimateSize> EstimateSize for Option<T> {
    fn estimate_size(&self) -> u64 {
        let inline = mem::size_of::<Option<T>>() as u64;
        match self {
            Some(value) => inline.max(value.estimate_size()),
            None => inline,
        }
    }
}

impl<T: EstimateSize> EstimateSize for Box<T> {
    fn estimate_size(&self) -> u64 {
        (mem::size_of::<Box<T>>() as u64) + self.as_ref().estimate_size()
    }
}

/// Measures values for the memory-usage interceptor.
pub trait SizeEstimator<V>: Send + Sync {
    /// Approximate size of `value` in bytes.
    fn measure(&self, value: &V) -> std::result::Result<u64, MeasureError>;

    /// Bucket the value is accounted under.
    fn type_label(&self, _value: &V) -> &'static str {
        std::any::type_name::<V>()
    }
}

/// Estimator backed by [`EstimateSize`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapSizeEstimator;

impl<V: EstimateSize> SizeEstimator<V> for HeapSizeEstimator {
    fn measure(&self, value: &V) -> std::result::Result<u64, MeasureError> {
        Ok(value.estimate_size())
    }
}

/// Estimator for value types that cannot be measured; always fails, which
/// leaves the interceptor counting objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableEstimator;

impl<V> SizeEstimator<V> for UnavailableEstimator {
    fn measure(&self, _value: &V) -> std::result::Result<u64, MeasureError> {
        Err(MeasureError("no size estimator configured".to_string()))
    }
}

// == Tracking Type ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackingType {
    #[serde(rename = "Object Size")]
    ObjectSize,
    #[serde(rename = "Object Count")]
    ObjectCount,
}

impl fmt::Display for TrackingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingType::ObjectSize => f.write_str("Object Size"),
            TrackingType::ObjectCount => f.write_str("Object Count"),
        }
    }
}

/// Point-in-time copy of the interceptor's counters.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryUsageReport {
    /// RFC 3339 capture time
    pub captured_at: String,
    pub tracking_type: TrackingType,
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
    pub tracked_keys: usize,
}

#[derive(Debug, Clone, Copy)]
struct KeyUsage {
    type_label: &'static str,
    size: u64,
}

fn saturating_sub(counter: &AtomicU64, amount: u64) {
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(amount))
    });
}

// == Memory Usage Interceptor ==
/// Bookkeeping keyed by cache key, independent of the container's storage.
///
/// Updates for one key are serialized by that key's slot in the size
/// table. The per-type and total counters are shared atomics that never
/// drop below zero; across different keys they are eventually consistent.
///
/// Once attached to a container with [`tracking`](Self::tracking), every
/// command and event only names the key to refresh: the value recorded is
/// whatever the container holds at that moment, read while the key's slot
/// is locked. Racing writers, removals and evictions of one key therefore
/// settle on the container's final state whatever order their hooks run in.
pub struct MemoryUsageInterceptor<K, V> {
    estimator: Arc<dyn SizeEstimator<V>>,
    container: Option<Weak<DataContainer<K, V>>>,
    sizes: DashMap<K, KeyUsage>,
    usage: DashMap<&'static str, AtomicU64>,
    total: AtomicU64,
    measure_sizes: AtomicBool,
}

impl<K: Eq + Hash, V> MemoryUsageInterceptor<K, V> {
    pub fn new(estimator: Arc<dyn SizeEstimator<V>>) -> Self {
        Self {
            estimator,
            container: None,
            sizes: DashMap::new(),
            usage: DashMap::new(),
            total: AtomicU64::new(0),
            measure_sizes: AtomicBool::new(true),
        }
    }

    /// Reconciles bookkeeping against `container` instead of trusting the
    /// values carried by commands. Holds a weak reference only.
    pub fn tracking(mut self, container: &Arc<DataContainer<K, V>>) -> Self {
        self.container = Some(Arc::downgrade(container));
        self
    }

    // == Queries ==
    /// Total memory, or object count, across all value types.
    pub fn total_memory(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Memory, or object count, per value type.
    pub fn memory_usage(&self) -> BTreeMap<String, u64> {
        self.usage
            .iter()
            .map(|e| (e.key().to_string(), e.value().load(Ordering::Acquire)))
            .collect()
    }

    /// [`memory_usage`](Self::memory_usage) rendered as a JSON object.
    pub fn memory_usage_as_string(&self) -> String {
        serde_json::to_string(&self.memory_usage()).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn tracking_type(&self) -> TrackingType {
        if self.measure_sizes.load(Ordering::Acquire) {
            TrackingType::ObjectSize
        } else {
            TrackingType::ObjectCount
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.sizes.len()
    }

    pub fn report(&self) -> MemoryUsageReport {
        MemoryUsageReport {
            captured_at: Utc::now().to_rfc3339(),
            tracking_type: self.tracking_type(),
            total: self.total_memory(),
            by_type: self.memory_usage(),
            tracked_keys: self.tracked_keys(),
        }
    }

    // == Management ==
    /// Forgets every tracked key and zeroes all counters.
    pub fn reset_statistics(&self) {
        self.sizes.clear();
        self.usage.clear();
        self.total.store(0, Ordering::Release);
    }

    /// Switches between measuring sizes and counting objects, then resets.
    pub fn toggle_measurement_type(&self) {
        self.measure_sizes.fetch_xor(true, Ordering::AcqRel);
        self.reset_statistics();
    }

    fn add_usage(&self, label: &'static str, size: u64) {
        self.usage
            .entry(label)
            .or_insert_with(AtomicU64::default)
            .fetch_add(size, Ordering::AcqRel);
        self.total.fetch_add(size, Ordering::AcqRel);
    }

    fn subtract_usage(&self, label: &'static str, size: u64) {
        if let Some(counter) = self.usage.get(label) {
            saturating_sub(&counter, size);
        }
        saturating_sub(&self.total, size);
    }

    /// Size of `value`, or 1 when counting objects.
    ///
    /// A failed measurement switches to counting for good (until toggled
    /// back). `None` tells the caller it was this call that switched, and
    /// that the bookkeeping must start over once no slot is held.
    fn measure(&self, value: &V) -> Option<u64> {
        if !self.measure_sizes.load(Ordering::Acquire) {
            return Some(1);
        }
        match self.estimator.measure(value) {
            Ok(size) => Some(size),
            Err(error) => {
                let switched = self
                    .measure_sizes
                    .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if !switched {
                    return Some(1);
                }
                warn!(%error, "Unable to measure value sizes, falling back to object counts");
                None
            }
        }
    }

    fn usage_of(&self, value: &V) -> Option<KeyUsage> {
        let size = self.measure(value)?;
        Some(KeyUsage {
            type_label: self.estimator.type_label(value),
            size,
        })
    }

    fn record(&self, slot: Entry<'_, K, KeyUsage>, usage: KeyUsage)
    where
        K: fmt::Debug,
    {
        match slot {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(usage);
                self.subtract_usage(previous.type_label, previous.size);
                self.add_usage(usage.type_label, usage.size);
                trace!(key = ?slot.key(), old = previous.size, new = usage.size, "Updated tracked size");
            }
            Entry::Vacant(slot) => {
                trace!(key = ?slot.key(), size = usage.size, type_label = usage.type_label, "Tracking new key");
                slot.insert(usage);
                self.add_usage(usage.type_label, usage.size);
            }
        }
    }

    fn forget(&self, slot: Entry<'_, K, KeyUsage>)
    where
        K: fmt::Debug,
    {
        if let Entry::Occupied(slot) = slot {
            trace!(key = ?slot.key(), size = slot.get().size, "Stopped tracking key");
            let previous = slot.remove();
            self.subtract_usage(previous.type_label, previous.size);
        }
    }

    // == Bookkeeping ==
    /// Records `value` as the current value of `key`.
    pub fn handle_add_or_update(&self, key: &K, value: &V)
    where
        K: Clone + fmt::Debug,
    {
        let usage = match self.usage_of(value) {
            Some(usage) => usage,
            None => {
                self.reset_statistics();
                KeyUsage {
                    type_label: self.estimator.type_label(value),
                    size: 1,
                }
            }
        };
        self.record(self.sizes.entry(key.clone()), usage);
    }

    /// Stops tracking `key`, subtracting its recorded size. Untracked keys are ignored.
    pub fn handle_remove(&self, key: &K)
    where
        K: fmt::Debug,
    {
        match self.sizes.remove(key) {
            Some((_, previous)) => {
                self.subtract_usage(previous.type_label, previous.size);
                trace!(key = ?key, size = previous.size, "Stopped tracking key");
            }
            None => debug!(key = ?key, "Asked to remove an untracked key"),
        }
    }
}

impl<K: CacheKey, V: CacheValue> MemoryUsageInterceptor<K, V> {
    /// Brings the bookkeeping for `key` in line with the container.
    ///
    /// Without a container to consult, `written` stands in for the stored
    /// value, `None` meaning the key is gone.
    fn sync_key(&self, key: &K, written: Option<&V>) {
        let Some(container) = self.container.as_ref().and_then(Weak::upgrade) else {
            match written {
                Some(value) => self.handle_add_or_update(key, value),
                None => self.handle_remove(key),
            }
            return;
        };

        let switched_to_counts = {
            let slot = self.sizes.entry(key.clone());
            match container.peek(key) {
                None => {
                    self.forget(slot);
                    false
                }
                Some(stored) => match self.usage_of(stored.value()) {
                    Some(usage) => {
                        self.record(slot, usage);
                        false
                    }
                    None => true,
                },
            }
        };
        if switched_to_counts {
            self.reset_statistics();
            self.sync_key(key, written);
        }
    }
}

// == Command Post-Hooks ==
impl<K: CacheKey, V: CacheValue> Visitor<K, V> for MemoryUsageInterceptor<K, V> {
    type Output = ();

    fn visit_put_key_value(&self, _ctx: &InvocationContext<K, V>, command: &PutKeyValueCommand<K, V>) {
        if command.is_successful() {
            self.sync_key(command.key(), Some(command.value()));
        }
    }

    fn visit_put_map(&self, _ctx: &InvocationContext<K, V>, command: &PutMapCommand<K, V>) {
        if command.is_successful() {
            for (key, value) in command.map() {
                self.sync_key(key, Some(value));
            }
        }
    }

    // A remove that found an expired entry is unsuccessful but still
    // dropped it, so the key is refreshed either way.
    fn visit_remove(&self, _ctx: &InvocationContext<K, V>, command: &RemoveCommand<K, V>) {
        self.sync_key(command.key(), None);
    }

    fn visit_evict(&self, _ctx: &InvocationContext<K, V>, command: &EvictCommand<K, V>) {
        if command.is_successful() {
            self.sync_key(command.key(), None);
        }
    }

    fn visit_expire(&self, _ctx: &InvocationContext<K, V>, command: &ExpireCommand<K, V>) {
        if let (true, Some(key)) = (command.is_successful(), command.key()) {
            self.sync_key(key, None);
        }
    }

    fn visit_clear(&self, _ctx: &InvocationContext<K, V>, command: &ClearCommand<K, V>) {
        if command.is_successful() {
            self.reset_statistics();
        }
    }
}

impl<K: CacheKey, V: CacheValue> Interceptor<K, V> for MemoryUsageInterceptor<K, V> {
    fn name(&self) -> &str {
        "MemoryUsageInterceptor"
    }

    fn handle(
        &self,
        ctx: &mut InvocationContext<K, V>,
        command: &mut Command<K, V>,
        next: Next<'_, K, V>,
    ) -> Result<Option<V>> {
        let result = next.invoke(ctx, command)?;
        command.accept_visitor(ctx, self);
        Ok(result)
    }
}

// == Eviction and Expiration Events ==
impl<K: CacheKey, V: CacheValue> CacheListener<K, V> for MemoryUsageInterceptor<K, V> {
    fn on_entries_evicted(&self, event: &EntriesEvictedEvent<'_, K, V>) {
        if !event.pre {
            for key in event.entries.keys() {
                self.sync_key(key, None);
            }
        }
    }

    fn on_entries_expired(&self, event: &EntriesExpiredEvent<'_, K, V>) {
        if !event.pre {
            for key in event.entries.keys() {
                self.sync_key(key, None);
            }
        }
    }
}
