//! Cache Core - concurrent in-process key/value cache storage
//!
//! Provides a bounded or unbounded, expiring, concurrent entry container
//! with LRU/LIRS eviction and passivation, plus a command/interceptor
//! pipeline that carries every mutation to it.

pub mod cache;
pub mod commands;
pub mod config;
pub mod container;
pub mod error;
pub mod interceptors;
pub mod notifications;
pub mod tasks;

use std::fmt::Debug;
use std::hash::Hash;

pub use cache::{Cache, CacheBuilder};
pub use commands::{Command, Flags, InvocationContext};
pub use config::Config;
pub use container::{CacheEntry, DataContainer, EvictionStrategy, EvictionThreadPolicy};
pub use error::{CacheError, Result};
pub use interceptors::{CacheStats, Interceptor, InterceptorChain, MemoryUsageReport};
pub use notifications::CacheListener;
pub use tasks::spawn_purge_task;

/// Bounds every cache key satisfies.
pub trait CacheKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bounds every cache value satisfies.
pub trait CacheValue: Clone + Debug + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Debug + Send + Sync + 'static {}
