//! Commands Module
//!
//! Mutating operations modeled as data. A [`Command`] travels through the
//! interceptor chain and is finally performed against the data container.

mod context;
mod visitor;
mod write;

use std::fmt;
use std::ops::BitOr;

use crate::container::DataContainer;
use crate::error::Result;
use crate::notifications::CacheNotifier;
use crate::{CacheKey, CacheValue};

pub use context::InvocationContext;
pub use visitor::Visitor;
pub use write::{
    ClearCommand, EvictCommand, ExpireCommand, PutKeyValueCommand, PutMapCommand, RemoveCommand,
};

/// Identifier reserved for commands that never leave the local node.
pub const LOCAL_ONLY_COMMAND_ID: i8 = -1;

// == Flags ==
/// Per-invocation behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u32);

impl Flags {
    /// Do not notify cache listeners about this command
    pub const SKIP_LISTENER_NOTIFICATION: Flags = Flags(1);
    /// Do not count this command in statistics
    pub const SKIP_STATISTICS: Flags = Flags(1 << 1);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

// == Command ==
/// A mutating operation, one variant per kind.
#[derive(Debug, Clone)]
pub enum Command<K, V> {
    PutKeyValue(PutKeyValueCommand<K, V>),
    PutMap(PutMapCommand<K, V>),
    Remove(RemoveCommand<K, V>),
    Evict(EvictCommand<K, V>),
    Expire(ExpireCommand<K, V>),
    Clear(ClearCommand<K, V>),
}

impl<K, V> Command<K, V> {
    /// Identifier under which the command would be replicated.
    pub fn command_id(&self) -> i8 {
        match self {
            Command::PutKeyValue(_) => 8,
            Command::PutMap(_) => 9,
            Command::Remove(_) => 10,
            Command::Clear(_) => 5,
            Command::Evict(_) | Command::Expire(_) => LOCAL_ONLY_COMMAND_ID,
        }
    }

    pub fn is_replicable(&self) -> bool {
        self.command_id() != LOCAL_ONLY_COMMAND_ID
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::PutKeyValue(_) => "PutKeyValue",
            Command::PutMap(_) => "PutMap",
            Command::Remove(_) => "Remove",
            Command::Evict(_) => "Evict",
            Command::Expire(_) => "Expire",
            Command::Clear(_) => "Clear",
        }
    }

    pub fn flags(&self) -> Flags {
        match self {
            Command::PutKeyValue(c) => c.flags(),
            Command::PutMap(c) => c.flags(),
            Command::Remove(c) => c.flags(),
            Command::Evict(c) => c.flags(),
            Command::Expire(c) => c.flags(),
            Command::Clear(c) => c.flags(),
        }
    }

    /// Outcome of `perform`; false until the command has been performed.
    pub fn is_successful(&self) -> bool {
        match self {
            Command::PutKeyValue(c) => c.is_successful(),
            Command::PutMap(c) => c.is_successful(),
            Command::Remove(c) => c.is_successful(),
            Command::Evict(c) => c.is_successful(),
            Command::Expire(c) => c.is_successful(),
            Command::Clear(c) => c.is_successful(),
        }
    }

    /// Dispatches to the visitor method matching this variant.
    pub fn accept_visitor<T>(&self, ctx: &InvocationContext<K, V>, visitor: &T) -> T::Output
    where
        T: Visitor<K, V> + ?Sized,
    {
        match self {
            Command::PutKeyValue(c) => visitor.visit_put_key_value(ctx, c),
            Command::PutMap(c) => visitor.visit_put_map(ctx, c),
            Command::Remove(c) => visitor.visit_remove(ctx, c),
            Command::Evict(c) => visitor.visit_evict(ctx, c),
            Command::Expire(c) => visitor.visit_expire(ctx, c),
            Command::Clear(c) => visitor.visit_clear(ctx, c),
        }
    }
}

impl<K: CacheKey, V: CacheValue> Command<K, V> {
    /// Executes the command against the container. A command can be
    /// performed once; later calls fail with a contract violation.
    ///
    /// # Returns
    /// The previous value for puts, the removed value for removes, and
    /// `None` for every other command.
    pub fn perform(
        &mut self,
        ctx: &mut InvocationContext<K, V>,
        container: &DataContainer<K, V>,
        notifier: &dyn CacheNotifier<K, V>,
    ) -> Result<Option<V>> {
        match self {
            Command::PutKeyValue(c) => c.perform(ctx, container, notifier),
            Command::PutMap(c) => c.perform(ctx, container, notifier),
            Command::Remove(c) => c.perform(ctx, container, notifier),
            Command::Evict(c) => c.perform(ctx, container, notifier),
            Command::Expire(c) => c.perform(ctx, container, notifier),
            Command::Clear(c) => c.perform(ctx, container, notifier),
        }
    }
}

impl<K, V> fmt::Display for Command<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Command", self.name())
    }
}

impl<K, V> From<PutKeyValueCommand<K, V>> for Command<K, V> {
    fn from(command: PutKeyValueCommand<K, V>) -> Self {
        Command::PutKeyValue(command)
    }
}

impl<K, V> From<PutMapCommand<K, V>> for Command<K, V> {
    fn from(command: PutMapCommand<K, V>) -> Self {
        Command::PutMap(command)
    }
}

impl<K, V> From<RemoveCommand<K, V>> for Command<K, V> {
    fn from(command: RemoveCommand<K, V>) -> Self {
        Command::Remove(command)
    }
}

impl<K, V> From<EvictCommand<K, V>> for Command<K, V> {
    fn from(command: EvictCommand<K, V>) -> Self {
        Command::Evict(command)
    }
}

impl<K, V> From<ExpireCommand<K, V>> for Command<K, V> {
    fn from(command: ExpireCommand<K, V>) -> Self {
        Command::Expire(command)
    }
}

impl<K, V> From<ClearCommand<K, V>> for Command<K, V> {
    fn from(command: ClearCommand<K, V>) -> Self {
        Command::Clear(command)
    }
}
