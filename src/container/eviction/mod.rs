//! Eviction Module
//!
//! Victim selection for bounded containers. Each segment of a bounded
//! container owns one policy instance and consults it while holding the
//! segment lock, so policies themselves need no synchronization.

mod lirs;
mod lru;

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

pub use lirs::LirsPolicy;
pub use lru::LruTracker;

// == Eviction Policy ==
/// Bookkeeping a bounded segment keeps to decide which key to evict.
pub trait EvictionPolicy<K>: Send {
    /// A key was inserted into the segment.
    fn record_insert(&mut self, key: &K);

    /// A resident key was read or overwritten.
    fn record_access(&mut self, key: &K);

    /// A key left the segment for any reason other than eviction.
    fn record_removal(&mut self, key: &K);

    /// Picks the next victim and forgets it as a resident key.
    fn select_victim(&mut self) -> Option<K>;

    /// Forgets everything.
    fn clear(&mut self);

    /// Number of resident keys tracked.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// == Eviction Strategy ==
/// Requested eviction strategy.
///
/// FIFO, UNORDERED and LRU all resolve to recency-based eviction; LIRS
/// resolves to the scan-resistant policy. NONE is only valid for an
/// unbounded container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionStrategy {
    None,
    Fifo,
    Unordered,
    Lru,
    Lirs,
}

/// Concrete victim-selection algorithm a strategy maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    Lru,
    Lirs,
}

impl EvictionStrategy {
    /// Maps the requested strategy onto a concrete algorithm.
    ///
    /// # Errors
    /// Returns a configuration error for strategies a bounded container
    /// cannot use.
    pub fn resolve(self) -> Result<Eviction> {
        match self {
            EvictionStrategy::Fifo | EvictionStrategy::Unordered | EvictionStrategy::Lru => {
                Ok(Eviction::Lru)
            }
            EvictionStrategy::Lirs => Ok(Eviction::Lirs),
            EvictionStrategy::None => Err(CacheError::Configuration(format!(
                "No such eviction strategy {} for a bounded container",
                self
            ))),
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionStrategy::None => "NONE",
            EvictionStrategy::Fifo => "FIFO",
            EvictionStrategy::Unordered => "UNORDERED",
            EvictionStrategy::Lru => "LRU",
            EvictionStrategy::Lirs => "LIRS",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(EvictionStrategy::None),
            "FIFO" => Ok(EvictionStrategy::Fifo),
            "UNORDERED" => Ok(EvictionStrategy::Unordered),
            "LRU" => Ok(EvictionStrategy::Lru),
            "LIRS" => Ok(EvictionStrategy::Lirs),
            other => Err(CacheError::Configuration(format!(
                "No such eviction strategy {}",
                other
            ))),
        }
    }
}

// == Eviction Thread Policy ==
/// Thread on which eviction callbacks run.
///
/// Both policies run eviction inline on the thread whose insert triggered
/// it; there is no separate eviction thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionThreadPolicy {
    Piggyback,
    Default,
}

impl EvictionThreadPolicy {
    /// True if eviction listeners execute on the inserting thread.
    pub fn runs_inline(self) -> bool {
        match self {
            EvictionThreadPolicy::Piggyback | EvictionThreadPolicy::Default => true,
        }
    }
}

impl fmt::Display for EvictionThreadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionThreadPolicy::Piggyback => f.write_str("PIGGYBACK"),
            EvictionThreadPolicy::Default => f.write_str("DEFAULT"),
        }
    }
}

impl FromStr for EvictionThreadPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PIGGYBACK" => Ok(EvictionThreadPolicy::Piggyback),
            "DEFAULT" => Ok(EvictionThreadPolicy::Default),
            other => Err(CacheError::Configuration(format!(
                "No such eviction thread policy {}",
                other
            ))),
        }
    }
}

// == Policy Construction ==
/// Builds a fresh policy instance for a segment of the given capacity.
pub(crate) fn new_policy<K>(eviction: Eviction, capacity: usize) -> Box<dyn EvictionPolicy<K>>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    match eviction {
        Eviction::Lru => Box::new(LruTracker::new()),
        Eviction::Lirs => Box::new(LirsPolicy::new(capacity)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_resolution() {
        assert_eq!(EvictionStrategy::Fifo.resolve().unwrap(), Eviction::Lru);
        assert_eq!(EvictionStrategy::Unordered.resolve().unwrap(), Eviction::Lru);
        assert_eq!(EvictionStrategy::Lru.resolve().unwrap(), Eviction::Lru);
        assert_eq!(EvictionStrategy::Lirs.resolve().unwrap(), Eviction::Lirs);
        assert!(matches!(
            EvictionStrategy::None.resolve(),
            Err(CacheError::Configuration(_))
        ));
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("lru".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lru);
        assert_eq!(" LIRS ".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lirs);
        assert!(matches!(
            "CLOCK".parse::<EvictionStrategy>(),
            Err(CacheError::Configuration(_))
        ));
    }

    #[test]
    fn test_strategy_display_round_trips() {
        for strategy in [
            EvictionStrategy::None,
            EvictionStrategy::Fifo,
            EvictionStrategy::Unordered,
            EvictionStrategy::Lru,
            EvictionStrategy::Lirs,
        ] {
            assert_eq!(strategy.to_string().parse::<EvictionStrategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_strategy_serde_names() {
        let json = serde_json::to_string(&EvictionStrategy::Unordered).unwrap();
        assert_eq!(json, "\"UNORDERED\"");
        let parsed: EvictionStrategy = serde_json::from_str("\"LIRS\"").unwrap();
        assert_eq!(parsed, EvictionStrategy::Lirs);
    }

    #[test]
    fn test_thread_policy() {
        assert!(EvictionThreadPolicy::Piggyback.runs_inline());
        assert!(EvictionThreadPolicy::Default.runs_inline());
        assert_eq!(
            "piggyback".parse::<EvictionThreadPolicy>().unwrap(),
            EvictionThreadPolicy::Piggyback
        );
        assert!(matches!(
            "EVICTION_THREAD".parse::<EvictionThreadPolicy>(),
            Err(CacheError::Configuration(_))
        ));
    }

    #[test]
    fn test_new_policy_kinds() {
        let mut lru = new_policy::<u32>(Eviction::Lru, 4);
        lru.record_insert(&1);
        lru.record_insert(&2);
        assert_eq!(lru.select_victim(), Some(1));

        let mut lirs = new_policy::<u32>(Eviction::Lirs, 4);
        lirs.record_insert(&1);
        assert_eq!(lirs.len(), 1);
    }
}
