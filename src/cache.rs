//! Cache Module
//!
//! Facade that wires a data container, its notifier and an interceptor
//! chain together and exposes the usual cache operations. Every mutation
//! travels through the chain as a command.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::commands::{
    ClearCommand, Command, EvictCommand, ExpireCommand, InvocationContext, PutKeyValueCommand,
    PutMapCommand, RemoveCommand,
};
use crate::config::Config;
use crate::container::{
    CacheEntry, Clock, Collaborators, DataContainer, EntryFactory, Lookup,
    NotifyingEvictionManager, Passivator,
};
use crate::error::Result;
use crate::interceptors::{
    CacheStats, Interceptor, InterceptorChain, MemoryUsageInterceptor, MemoryUsageReport,
    SizeEstimator, StatisticsInterceptor, UnavailableEstimator,
};
use crate::notifications::{CacheListener, ListenerNotifier};
use crate::{CacheKey, CacheValue};

// == Cache Builder ==
/// Assembles a [`Cache`] from a [`Config`] plus optional collaborators.
pub struct CacheBuilder<K, V> {
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    passivator: Option<Arc<dyn Passivator<K, V>>>,
    size_estimator: Option<Arc<dyn SizeEstimator<V>>>,
    interceptors: Vec<Arc<dyn Interceptor<K, V>>>,
}

impl<K: CacheKey, V: CacheValue> CacheBuilder<K, V> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: None,
            passivator: None,
            size_estimator: None,
            interceptors: Vec::new(),
        }
    }

    /// Clock used to stamp and expire entries (system clock by default).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Backing store that receives entries chosen for eviction.
    pub fn passivator(mut self, passivator: Arc<dyn Passivator<K, V>>) -> Self {
        self.passivator = Some(passivator);
        self
    }

    /// Estimator used when memory usage tracking is enabled. Without one,
    /// the memory interceptor counts objects.
    pub fn size_estimator(mut self, size_estimator: Arc<dyn SizeEstimator<V>>) -> Self {
        self.size_estimator = Some(size_estimator);
        self
    }

    /// Appends a custom interceptor after the built-in ones.
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor<K, V>>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Builds the cache.
    ///
    /// # Errors
    /// Returns `CacheError::Configuration` if the configuration describes a
    /// bounded container that cannot be built.
    pub fn build(self) -> Result<Cache<K, V>> {
        let notifier: Arc<ListenerNotifier<K, V>> = Arc::new(ListenerNotifier::new());
        let eviction_manager: Arc<NotifyingEvictionManager<K, V>> =
            Arc::new(NotifyingEvictionManager::new(notifier.clone()));

        let mut collaborators = Collaborators::new(eviction_manager);
        if let Some(clock) = self.clock {
            collaborators = collaborators.with_entry_factory(EntryFactory::new(clock));
        }
        if let Some(passivator) = self.passivator {
            collaborators = collaborators.with_passivator(passivator);
        }

        let container = Arc::new(DataContainer::from_config(&self.config, collaborators)?);
        let chain = InterceptorChain::new(container.clone(), notifier.clone());

        let statistics = self.config.statistics_enabled.then(|| {
            let statistics = Arc::new(StatisticsInterceptor::new());
            chain.add_interceptor(statistics.clone());
            notifier.add_listener(statistics.clone());
            statistics
        });

        let memory = self.config.track_memory_usage.then(|| {
            let estimator: Arc<dyn SizeEstimator<V>> = match self.size_estimator {
                Some(estimator) => estimator,
                None => Arc::new(UnavailableEstimator),
            };
            let memory = Arc::new(MemoryUsageInterceptor::new(estimator).tracking(&container));
            chain.add_interceptor(memory.clone());
            notifier.add_listener(memory.clone());
            memory
        });

        for interceptor in self.interceptors {
            chain.add_interceptor(interceptor);
        }

        info!(
            max_entries = ?container.max_entries(),
            strategy = %self.config.eviction_strategy,
            interceptors = ?chain.interceptor_names(),
            "Cache started"
        );

        Ok(Cache {
            config: self.config,
            container,
            notifier,
            chain,
            statistics,
            memory,
        })
    }
}

// == Cache ==
/// A concurrent cache: data container plus command pipeline.
pub struct Cache<K, V> {
    config: Config,
    container: Arc<DataContainer<K, V>>,
    notifier: Arc<ListenerNotifier<K, V>>,
    chain: InterceptorChain<K, V>,
    statistics: Option<Arc<StatisticsInterceptor>>,
    memory: Option<Arc<MemoryUsageInterceptor<K, V>>>,
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    pub fn builder(config: Config) -> CacheBuilder<K, V> {
        CacheBuilder::new(config)
    }

    /// Builds a cache with default collaborators.
    pub fn new(config: Config) -> Result<Self> {
        CacheBuilder::new(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn container(&self) -> &Arc<DataContainer<K, V>> {
        &self.container
    }

    pub fn chain(&self) -> &InterceptorChain<K, V> {
        &self.chain
    }

    // == Writes ==
    /// Stores a value with the configured default lifespan and max idle.
    ///
    /// # Returns
    /// The value previously stored under `key`, if it was live.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.put_with(key, value, self.config.default_lifespan, self.config.default_max_idle)
    }

    /// Stores a value with an explicit lifespan and max idle (`None` = no limit).
    pub fn put_with(
        &self,
        key: K,
        value: V,
        lifespan: Option<Duration>,
        max_idle: Option<Duration>,
    ) -> Result<Option<V>> {
        let mut command: Command<K, V> = PutKeyValueCommand::new(key, value)
            .with_lifespan(lifespan)
            .with_max_idle(max_idle)
            .into();
        self.invoke(&mut command)
    }

    /// Stores every pair with the configured default lifespan and max idle.
    pub fn put_all(&self, entries: HashMap<K, V>) -> Result<()> {
        let mut command: Command<K, V> = PutMapCommand::new(entries)
            .with_lifespan(self.config.default_lifespan)
            .with_max_idle(self.config.default_max_idle)
            .into();
        self.invoke(&mut command).map(|_| ())
    }

    /// Removes `key`, returning its value if it was live.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let mut command: Command<K, V> = RemoveCommand::new(key.clone()).into();
        self.invoke(&mut command)
    }

    /// Passivates and drops `key` from memory. Returns true if it was present.
    pub fn evict(&self, key: &K) -> Result<bool> {
        let mut command: Command<K, V> = EvictCommand::new(key.clone()).into();
        self.invoke(&mut command)?;
        Ok(command.is_successful())
    }

    /// Drops `key` as expired, notifying expiration listeners. Returns true
    /// if an entry was present.
    pub fn expire(&self, key: &K) -> Result<bool> {
        let mut command: Command<K, V> = ExpireCommand::new(key.clone()).into();
        self.invoke(&mut command)?;
        Ok(command.is_successful())
    }

    pub fn clear(&self) -> Result<()> {
        let mut command: Command<K, V> = ClearCommand::new().into();
        self.invoke(&mut command).map(|_| ())
    }

    /// Dispatches an arbitrary command through the chain with a fresh context.
    pub fn invoke(&self, command: &mut Command<K, V>) -> Result<Option<V>> {
        let mut ctx = InvocationContext::new();
        self.chain.invoke(&mut ctx, command)
    }

    // == Reads ==
    /// Returns the live value for `key`.
    ///
    /// An expired entry found here is expired through the chain, so
    /// interceptors and listeners see the expiration.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = match self.container.lookup(key, true) {
            Lookup::Hit(entry) => Some(entry.into_value()),
            Lookup::Expired => {
                self.expire_stale(key);
                None
            }
            Lookup::Miss => None,
        };
        if let Some(statistics) = &self.statistics {
            match value {
                Some(_) => statistics.record_hit(),
                None => statistics.record_miss(),
            }
        }
        value
    }

    /// Expiry-aware presence check that does not touch the entry.
    pub fn contains_key(&self, key: &K) -> bool {
        match self.container.lookup(key, false) {
            Lookup::Hit(_) => true,
            Lookup::Expired => {
                self.expire_stale(key);
                false
            }
            Lookup::Miss => false,
        }
    }

    /// Stored entry for `key` without expiry checks or touching.
    pub fn peek(&self, key: &K) -> Option<CacheEntry<K, V>> {
        self.container.peek(key)
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub fn size(&self) -> usize {
        self.container.size()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    /// Sweeps expired entries out of the container. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.container.purge_expired()
    }

    /// Expires an entry a read just saw expired, unless it was renewed or
    /// removed since.
    fn expire_stale(&self, key: &K) {
        let mut command: Command<K, V> = ExpireCommand::new(key.clone()).if_expired().into();
        if let Err(error) = self.invoke(&mut command) {
            warn!(key = ?key, %error, "Failed to expire stale entry");
            self.container.take_if_expired(key, self.container.now());
        }
    }

    // == Observability ==
    /// Statistics snapshot, if statistics are enabled.
    pub fn stats(&self) -> Option<CacheStats> {
        self.statistics.as_ref().map(|s| s.snapshot())
    }

    pub fn statistics(&self) -> Option<&Arc<StatisticsInterceptor>> {
        self.statistics.as_ref()
    }

    /// Memory usage report, if memory usage tracking is enabled.
    pub fn memory_usage(&self) -> Option<MemoryUsageReport> {
        self.memory.as_ref().map(|m| m.report())
    }

    pub fn memory_interceptor(&self) -> Option<&Arc<MemoryUsageInterceptor<K, V>>> {
        self.memory.as_ref()
    }

    // == Extension ==
    pub fn add_listener(&self, listener: Arc<dyn CacheListener<K, V>>) {
        self.notifier.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn CacheListener<K, V>>) -> bool {
        self.notifier.remove_listener(listener)
    }

    /// Appends an interceptor to the end of the chain.
    pub fn add_interceptor(&self, interceptor: Arc<dyn Interceptor<K, V>>) {
        self.chain.add_interceptor(interceptor);
    }
}
