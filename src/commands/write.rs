//! Write Commands
//!
//! One struct per mutating operation. Each carries its arguments, its
//! flags and the outcome of its single `perform` against the container.

use std::collections::HashMap;
use std::time::Duration;

use tracing::trace;

use crate::commands::{Flags, InvocationContext};
use crate::container::{CacheEntry, DataContainer, EntryVersion};
use crate::error::{CacheError, Result};
use crate::notifications::CacheNotifier;
use crate::{CacheKey, CacheValue};

/// Outcome tracking shared by every command.
#[derive(Debug, Clone, Copy, Default)]
struct Execution {
    performed: bool,
    successful: bool,
}

impl Execution {
    fn begin(&mut self, command: &str) -> Result<()> {
        if self.performed {
            return Err(CacheError::ContractViolation(format!(
                "{} was already performed",
                command
            )));
        }
        self.performed = true;
        Ok(())
    }
}

fn live<K, V>(entry: Option<CacheEntry<K, V>>, now: u64) -> Option<CacheEntry<K, V>> {
    entry.filter(|e| !e.is_expired(now))
}

/// Previous live value of `key`, preferring what the context already looked up.
fn previous_entry<K: CacheKey, V: CacheValue>(
    ctx: &InvocationContext<K, V>,
    container: &DataContainer<K, V>,
    key: &K,
) -> Option<CacheEntry<K, V>> {
    let looked_up = ctx.lookup_entry(key).cloned();
    live(looked_up.or_else(|| container.peek(key)), container.now())
}

// == Put Key Value ==
/// Stores one value under one key.
#[derive(Debug, Clone)]
pub struct PutKeyValueCommand<K, V> {
    key: K,
    value: V,
    version: Option<EntryVersion>,
    lifespan: Option<Duration>,
    max_idle: Option<Duration>,
    flags: Flags,
    execution: Execution,
}

impl<K, V> PutKeyValueCommand<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            version: None,
            lifespan: None,
            max_idle: None,
            flags: Flags::empty(),
            execution: Execution::default(),
        }
    }

    pub fn with_version(mut self, version: EntryVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_lifespan(mut self, lifespan: Option<Duration>) -> Self {
        self.lifespan = lifespan;
        self
    }

    pub fn with_max_idle(mut self, max_idle: Option<Duration>) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn version(&self) -> Option<EntryVersion> {
        self.version
    }

    pub fn lifespan(&self) -> Option<Duration> {
        self.lifespan
    }

    pub fn max_idle(&self) -> Option<Duration> {
        self.max_idle
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn is_successful(&self) -> bool {
        self.execution.successful
    }
}

impl<K: CacheKey, V: CacheValue> PutKeyValueCommand<K, V> {
    /// Upserts the entry and returns the value it replaced, if one was live.
    pub(crate) fn perform(
        &mut self,
        ctx: &mut InvocationContext<K, V>,
        container: &DataContainer<K, V>,
        notifier: &dyn CacheNotifier<K, V>,
    ) -> Result<Option<V>> {
        self.execution.begin("PutKeyValueCommand")?;
        let notify = !self.flags.contains(Flags::SKIP_LISTENER_NOTIFICATION);

        let previous = previous_entry(ctx, container, &self.key);
        if notify {
            notifier.notify_entry_modified(&self.key, previous.as_ref().map(|e| e.value()), true, ctx);
        }

        container.put(
            self.key.clone(),
            self.value.clone(),
            self.version,
            self.lifespan,
            self.max_idle,
        );
        if let Some(stored) = container.peek(&self.key) {
            ctx.put_looked_up_entry(self.key.clone(), stored);
        }
        self.execution.successful = true;

        if notify {
            notifier.notify_entry_modified(&self.key, Some(&self.value), false, ctx);
        }
        Ok(previous.map(CacheEntry::into_value))
    }
}

// == Put Map ==
/// Stores several key/value pairs sharing one lifespan and max idle.
#[derive(Debug, Clone)]
pub struct PutMapCommand<K, V> {
    map: HashMap<K, V>,
    lifespan: Option<Duration>,
    max_idle: Option<Duration>,
    flags: Flags,
    execution: Execution,
}

impl<K, V> PutMapCommand<K, V> {
    pub fn new(map: HashMap<K, V>) -> Self {
        Self {
            map,
            lifespan: None,
            max_idle: None,
            flags: Flags::empty(),
            execution: Execution::default(),
        }
    }

    pub fn with_lifespan(mut self, lifespan: Option<Duration>) -> Self {
        self.lifespan = lifespan;
        self
    }

    pub fn with_max_idle(mut self, max_idle: Option<Duration>) -> Self {
        self.max_idle = max_idle;
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn map(&self) -> &HashMap<K, V> {
        &self.map
    }

    pub fn lifespan(&self) -> Option<Duration> {
        self.lifespan
    }

    pub fn max_idle(&self) -> Option<Duration> {
        self.max_idle
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn is_successful(&self) -> bool {
        self.execution.successful
    }
}

impl<K: CacheKey, V: CacheValue> PutMapCommand<K, V> {
    pub(crate) fn perform(
        &mut self,
        ctx: &mut InvocationContext<K, V>,
        container: &DataContainer<K, V>,
        notifier: &dyn CacheNotifier<K, V>,
    ) -> Result<Option<V>> {
        self.execution.begin("PutMapCommand")?;
        let notify = !self.flags.contains(Flags::SKIP_LISTENER_NOTIFICATION);

        for (key, value) in &self.map {
            if notify {
                let previous = previous_entry(ctx, container, key);
                notifier.notify_entry_modified(key, previous.as_ref().map(|e| e.value()), true, ctx);
            }
            container.put(key.clone(), value.clone(), None, self.lifespan, self.max_idle);
            if let Some(stored) = container.peek(key) {
                ctx.put_looked_up_entry(key.clone(), stored);
            }
            if notify {
                notifier.notify_entry_modified(key, Some(value), false, ctx);
            }
        }
        trace!(count = self.map.len(), "Stored map");
        self.execution.successful = true;
        Ok(None)
    }
}

// == Remove ==
/// Removes one key. Successful only if a live entry was removed.
#[derive(Debug, Clone)]
pub struct RemoveCommand<K, V> {
    key: K,
    flags: Flags,
    execution: Execution,
    removed: Option<V>,
}

impl<K, V> RemoveCommand<K, V> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            flags: Flags::empty(),
            execution: Execution::default(),
            removed: None,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Value removed by a successful perform.
    pub fn removed_value(&self) -> Option<&V> {
        self.removed.as_ref()
    }

    pub fn is_successful(&self) -> bool {
        self.execution.successful
    }
}

impl<K: CacheKey, V: CacheValue> RemoveCommand<K, V> {
    pub(crate) fn perform(
        &mut self,
        ctx: &mut InvocationContext<K, V>,
        container: &DataContainer<K, V>,
        notifier: &dyn CacheNotifier<K, V>,
    ) -> Result<Option<V>> {
        self.execution.begin("RemoveCommand")?;
        let notify = !self.flags.contains(Flags::SKIP_LISTENER_NOTIFICATION);
        let now = container.now();

        if notify {
            if let Some(existing) = live(container.peek(&self.key), now) {
                notifier.notify_entry_removed(&self.key, Some(existing.value()), true, ctx);
            }
        }

        ctx.remove_looked_up_entry(&self.key);
        let removed = match container.take(&self.key) {
            Some(stale) if stale.is_expired(now) => {
                // Gone either way; report it the way lazy expiry would
                if notify {
                    let batch = HashMap::from([(self.key.clone(), stale.into_value())]);
                    notifier.notify_entries_expired(&batch, Some(&*ctx));
                }
                None
            }
            taken => taken.map(CacheEntry::into_value),
        };
        self.execution.successful = removed.is_some();

        if let Some(value) = &removed {
            if notify {
                notifier.notify_entry_removed(&self.key, Some(value), false, ctx);
            }
        }
        self.removed = removed.clone();
        Ok(removed)
    }
}

// == Evict ==
/// Passivates and drops one key from memory. Never replicated.
#[derive(Debug, Clone)]
pub struct EvictCommand<K, V> {
    key: K,
    flags: Flags,
    execution: Execution,
    evicted: Option<V>,
}

impl<K, V> EvictCommand<K, V> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            flags: Flags::empty(),
            execution: Execution::default(),
            evicted: None,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn evicted_value(&self) -> Option<&V> {
        self.evicted.as_ref()
    }

    pub fn is_successful(&self) -> bool {
        self.execution.successful
    }
}

impl<K: CacheKey, V: CacheValue> EvictCommand<K, V> {
    pub(crate) fn perform(
        &mut self,
        ctx: &mut InvocationContext<K, V>,
        container: &DataContainer<K, V>,
        notifier: &dyn CacheNotifier<K, V>,
    ) -> Result<Option<V>> {
        self.execution.begin("EvictCommand")?;
        let notify = !self.flags.contains(Flags::SKIP_LISTENER_NOTIFICATION);

        if notify {
            if let Some(existing) = container.peek(&self.key) {
                let batch = HashMap::from([(self.key.clone(), existing.into_value())]);
                notifier.notify_entries_evicted(&batch, true, Some(&*ctx));
            }
        }

        ctx.remove_looked_up_entry(&self.key);
        let evicted = container.evict(&self.key).map(CacheEntry::into_value);
        self.execution.successful = evicted.is_some();

        if let Some(value) = &evicted {
            if notify {
                let batch = HashMap::from([(self.key.clone(), value.clone())]);
                notifier.notify_entries_evicted(&batch, false, Some(&*ctx));
            }
        }
        self.evicted = evicted;
        Ok(None)
    }
}

// == Expire ==
/// Removes one entry because it expired and reports it as expired rather
/// than removed. Never replicated.
///
/// The key is optional only so that a missing one can be rejected with an
/// error at perform time.
#[derive(Debug, Clone)]
pub struct ExpireCommand<K, V> {
    key: Option<K>,
    flags: Flags,
    only_if_expired: bool,
    execution: Execution,
    expired: Option<V>,
}

impl<K, V> ExpireCommand<K, V> {
    pub fn new(key: K) -> Self {
        Self::for_key(Some(key))
    }

    pub fn for_key(key: Option<K>) -> Self {
        Self {
            key,
            flags: Flags::empty(),
            only_if_expired: false,
            execution: Execution::default(),
            expired: None,
        }
    }

    /// Leaves the entry alone unless it is still expired when performed,
    /// so a write that renewed it in the meantime survives.
    pub fn if_expired(mut self) -> Self {
        self.only_if_expired = true;
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn expired_value(&self) -> Option<&V> {
        self.expired.as_ref()
    }

    pub fn is_successful(&self) -> bool {
        self.execution.successful
    }
}

impl<K: CacheKey, V: CacheValue> ExpireCommand<K, V> {
    pub(crate) fn perform(
        &mut self,
        ctx: &mut InvocationContext<K, V>,
        container: &DataContainer<K, V>,
        notifier: &dyn CacheNotifier<K, V>,
    ) -> Result<Option<V>> {
        let Some(key) = self.key.clone() else {
            return Err(CacheError::ContractViolation(
                "ExpireCommand requires a key".to_string(),
            ));
        };
        self.execution.begin("ExpireCommand")?;

        ctx.remove_looked_up_entry(&key);
        let taken = if self.only_if_expired {
            container.take_if_expired(&key, container.now())
        } else {
            container.take(&key)
        };
        let expired = taken.map(CacheEntry::into_value);
        self.execution.successful = expired.is_some();

        if let Some(value) = &expired {
            trace!(key = ?key, "Expired entry");
            if !self.flags.contains(Flags::SKIP_LISTENER_NOTIFICATION) {
                let batch = HashMap::from([(key, value.clone())]);
                notifier.notify_entries_expired(&batch, Some(&*ctx));
            }
        }
        self.expired = expired;
        Ok(None)
    }
}

// == Clear ==
/// Removes every entry. Always successful.
#[derive(Debug, Clone)]
pub struct ClearCommand<K, V> {
    flags: Flags,
    execution: Execution,
    cleared: usize,
    _entries: std::marker::PhantomData<fn() -> (K, V)>,
}

impl<K, V> ClearCommand<K, V> {
    pub fn new() -> Self {
        Self {
            flags: Flags::empty(),
            execution: Execution::default(),
            cleared: 0,
            _entries: std::marker::PhantomData,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Number of entries the container held when it was cleared.
    pub fn cleared(&self) -> usize {
        self.cleared
    }

    pub fn is_successful(&self) -> bool {
        self.execution.successful
    }
}

impl<K, V> Default for ClearCommand<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: CacheKey, V: CacheValue> ClearCommand<K, V> {
    pub(crate) fn perform(
        &mut self,
        ctx: &mut InvocationContext<K, V>,
        container: &DataContainer<K, V>,
        notifier: &dyn CacheNotifier<K, V>,
    ) -> Result<Option<V>> {
        self.execution.begin("ClearCommand")?;
        let notify = !self.flags.contains(Flags::SKIP_LISTENER_NOTIFICATION);

        let entries: Vec<CacheEntry<K, V>> = if notify { container.iter().collect() } else { Vec::new() };
        for entry in &entries {
            notifier.notify_entry_removed(entry.key(), Some(entry.value()), true, ctx);
        }

        self.cleared = container.size();
        container.clear();
        ctx.clear_looked_up_entries();
        self.execution.successful = true;

        for entry in &entries {
            notifier.notify_entry_removed(entry.key(), Some(entry.value()), false, ctx);
        }
        trace!(cleared = self.cleared, "Cleared container");
        Ok(None)
    }
}
