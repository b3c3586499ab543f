//! Container Module
//!
//! Entry storage: entries and their factory, eviction policies, the
//! bounded and unbounded data container and its read-only views.

mod bounded;
mod clock;
mod entry;
mod eviction;
mod factory;
mod listener;
mod store;
mod views;

#[cfg(test)]
mod property_tests;

pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, EntryVersion};
pub use eviction::{
    Eviction, EvictionPolicy, EvictionStrategy, EvictionThreadPolicy, LirsPolicy, LruTracker,
};
pub use factory::EntryFactory;
pub use listener::{
    EntryBatch, EvictionListener, EvictionManager, NoopPassivator, NotifyingEvictionManager,
    Passivator,
};
pub use store::{Collaborators, DataContainer, EntryIter};
pub(crate) use store::Lookup;
pub use views::{EntrySet, KeySet, Values};
