//! Interceptors Module
//!
//! Cross-cutting handlers wrapped around command execution. Each
//! interceptor receives the command together with a [`Next`] continuation
//! standing for the rest of the chain; calling it runs every later
//! interceptor and finally the command itself.
//!
//! # Interceptors
//! - Statistics: hit, miss, store, removal, eviction and expiration counters
//! - Memory usage: approximate memory (or object count) per value type

mod chain;
mod memory;
mod statistics;

use std::sync::Arc;

use tracing::trace;

use crate::commands::{Command, InvocationContext};
use crate::container::DataContainer;
use crate::error::Result;
use crate::notifications::CacheNotifier;
use crate::{CacheKey, CacheValue};

pub use chain::InterceptorChain;
pub use memory::{
    EstimateSize, HeapSizeEstimator, MemoryUsageInterceptor, MemoryUsageReport, SizeEstimator,
    TrackingType, UnavailableEstimator,
};
pub use statistics::{CacheStats, StatisticsInterceptor};

// == Interceptor ==
/// One link of the interceptor chain.
pub trait Interceptor<K, V>: Send + Sync {
    /// Name used to find the interceptor in its chain.
    fn name(&self) -> &str;

    /// Handles a command on its way to the container.
    ///
    /// Work done before `next.invoke` is a pre-hook, work done after it a
    /// post-hook. Dropping `next` without invoking it skips the rest of the
    /// chain, the command's own `perform` included. The default passes
    /// straight through.
    fn handle(
        &self,
        ctx: &mut InvocationContext<K, V>,
        command: &mut Command<K, V>,
        next: Next<'_, K, V>,
    ) -> Result<Option<V>>
    where
        K: CacheKey,
        V: CacheValue,
    {
        next.invoke(ctx, command)
    }
}

// == Next ==
/// The remainder of a chain, consumed by the single call that runs it.
pub struct Next<'a, K, V> {
    remaining: &'a [Arc<dyn Interceptor<K, V>>],
    container: &'a DataContainer<K, V>,
    notifier: &'a dyn CacheNotifier<K, V>,
}

impl<'a, K: CacheKey, V: CacheValue> Next<'a, K, V> {
    pub(crate) fn new(
        remaining: &'a [Arc<dyn Interceptor<K, V>>],
        container: &'a DataContainer<K, V>,
        notifier: &'a dyn CacheNotifier<K, V>,
    ) -> Self {
        Self {
            remaining,
            container,
            notifier,
        }
    }

    /// Runs the rest of the chain and returns its result.
    pub fn invoke(
        self,
        ctx: &mut InvocationContext<K, V>,
        command: &mut Command<K, V>,
    ) -> Result<Option<V>> {
        match self.remaining.split_first() {
            Some((head, rest)) => {
                trace!(interceptor = head.name(), command = command.name(), "Entering interceptor");
                head.handle(ctx, command, Next { remaining: rest, ..self })
            }
            None => {
                trace!(command = command.name(), "Performing command");
                command.perform(ctx, self.container, self.notifier)
            }
        }
    }

    /// Container the command will be performed against.
    pub fn container(&self) -> &'a DataContainer<K, V> {
        self.container
    }

    /// Interceptors still ahead of the command.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}
