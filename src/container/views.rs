//! Read-only views over a [`DataContainer`].
//!
//! Views borrow the container and observe its current contents. Every
//! mutator returns `CacheError::Unsupported` and leaves the container as it was.

use crate::container::entry::CacheEntry;
use crate::container::store::DataContainer;
use crate::error::{CacheError, Result};
use crate::{CacheKey, CacheValue};

/// The mutators every view rejects.
macro_rules! rejected_mutators {
    ($view:literal, insert: $item:ty, remove: $item_ref:ty) => {
        pub fn insert(&self, _item: $item) -> Result<bool> {
            Err(CacheError::read_only(concat!($view, "::insert")))
        }

        pub fn remove(&self, _item: &$item_ref) -> Result<bool> {
            Err(CacheError::read_only(concat!($view, "::remove")))
        }

        pub fn clear(&self) -> Result<()> {
            Err(CacheError::read_only(concat!($view, "::clear")))
        }
    };
}

// == Key Set ==
pub struct KeySet<'a, K, V> {
    container: &'a DataContainer<K, V>,
}

impl<'a, K: CacheKey, V: CacheValue> KeySet<'a, K, V> {
    pub(crate) fn new(container: &'a DataContainer<K, V>) -> Self {
        Self { container }
    }

    pub fn len(&self) -> usize {
        self.container.size()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    /// True if the key is stored, expired or not.
    pub fn contains(&self, key: &K) -> bool {
        self.container.contains_raw(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = K> + 'a {
        self.container.iter().map(|entry| entry.key().clone())
    }

    rejected_mutators!("KeySet", insert: K, remove: K);
}

// == Values ==
pub struct Values<'a, K, V> {
    container: &'a DataContainer<K, V>,
}

impl<'a, K: CacheKey, V: CacheValue> Values<'a, K, V> {
    pub(crate) fn new(container: &'a DataContainer<K, V>) -> Self {
        Self { container }
    }

    pub fn len(&self) -> usize {
        self.container.size()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = V> + 'a {
        self.container.iter().map(CacheEntry::into_value)
    }

    rejected_mutators!("Values", insert: V, remove: V);
}

impl<K: CacheKey, V: CacheValue + PartialEq> Values<'_, K, V> {
    pub fn contains(&self, value: &V) -> bool {
        self.container.iter().any(|entry| entry.value() == value)
    }
}

// == Entry Set ==
/// Entries handed out by this view are copies; later writes to the
/// container never show through them.
pub struct EntrySet<'a, K, V> {
    container: &'a DataContainer<K, V>,
}

impl<'a, K: CacheKey, V: CacheValue> EntrySet<'a, K, V> {
    pub(crate) fn new(container: &'a DataContainer<K, V>) -> Self {
        Self { container }
    }

    pub fn len(&self) -> usize {
        self.container.size()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.container.contains_raw(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = CacheEntry<K, V>> + 'a {
        self.container.iter()
    }

    rejected_mutators!("EntrySet", insert: CacheEntry<K, V>, remove: K);
}
