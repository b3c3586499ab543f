//! Interceptor Chain
//!
//! Ordered, editable list of interceptors in front of one data container.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{Interceptor, Next};
use crate::commands::{Command, InvocationContext};
use crate::container::DataContainer;
use crate::error::{CacheError, Result};
use crate::notifications::CacheNotifier;
use crate::{CacheKey, CacheValue};

type Interceptors<K, V> = Vec<Arc<dyn Interceptor<K, V>>>;

// == Interceptor Chain ==
/// Runs every command through its interceptors, first to last, and then
/// performs it against the container. Post-hooks unwind last to first.
pub struct InterceptorChain<K, V> {
    interceptors: RwLock<Interceptors<K, V>>,
    container: Arc<DataContainer<K, V>>,
    notifier: Arc<dyn CacheNotifier<K, V>>,
}

impl<K: CacheKey, V: CacheValue> InterceptorChain<K, V> {
    /// Creates an empty chain; commands go straight to `perform`.
    pub fn new(container: Arc<DataContainer<K, V>>, notifier: Arc<dyn CacheNotifier<K, V>>) -> Self {
        Self {
            interceptors: RwLock::new(Vec::new()),
            container,
            notifier,
        }
    }

    pub fn container(&self) -> &Arc<DataContainer<K, V>> {
        &self.container
    }

    pub fn notifier(&self) -> &Arc<dyn CacheNotifier<K, V>> {
        &self.notifier
    }

    // == Editing ==
    /// Appends an interceptor, making it the last before the command.
    pub fn add_interceptor(&self, interceptor: Arc<dyn Interceptor<K, V>>) {
        debug!(interceptor = interceptor.name(), "Adding interceptor");
        self.interceptors.write().push(interceptor);
    }

    /// Inserts an interceptor at `position`, 0 being the first to run.
    ///
    /// # Errors
    /// Returns `CacheError::ContractViolation` if `position` is past the end.
    pub fn insert_interceptor(&self, interceptor: Arc<dyn Interceptor<K, V>>, position: usize) -> Result<()> {
        let mut interceptors = self.interceptors.write();
        if position > interceptors.len() {
            return Err(CacheError::ContractViolation(format!(
                "Cannot insert interceptor at position {} in a chain of {}",
                position,
                interceptors.len()
            )));
        }
        debug!(interceptor = interceptor.name(), position, "Inserting interceptor");
        interceptors.insert(position, interceptor);
        Ok(())
    }

    /// Removes every interceptor with the given name. Returns true if any was removed.
    pub fn remove_interceptor(&self, name: &str) -> bool {
        let mut interceptors = self.interceptors.write();
        let before = interceptors.len();
        interceptors.retain(|i| i.name() != name);
        interceptors.len() != before
    }

    pub fn interceptor_names(&self) -> Vec<String> {
        self.interceptors
            .read()
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Invoke ==
    /// Dispatches a command through the chain.
    ///
    /// The chain is snapshotted first, so edits made while a command is in
    /// flight apply to later commands only.
    ///
    /// # Errors
    /// Returns `CacheError::ContractViolation` if `ctx` is already
    /// traversing a chain, plus whatever an interceptor or the command
    /// itself returns.
    pub fn invoke(&self, ctx: &mut InvocationContext<K, V>, command: &mut Command<K, V>) -> Result<Option<V>> {
        if ctx.is_in_flight() {
            return Err(CacheError::ContractViolation(format!(
                "{} dispatched again from within its own traversal",
                command
            )));
        }

        let interceptors = self.interceptors.read().clone();
        ctx.set_in_flight(true);
        let result = Next::new(&interceptors, &self.container, self.notifier.as_ref()).invoke(ctx, command);
        ctx.set_in_flight(false);
        result
    }
}
