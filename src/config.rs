//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::container::{EvictionStrategy, EvictionThreadPolicy};
use crate::error::Result;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of entries the cache can hold (0 = unbounded)
    pub max_entries: usize,
    /// Victim selection strategy for a bounded container
    pub eviction_strategy: EvictionStrategy,
    /// Thread on which eviction callbacks run
    pub thread_policy: EvictionThreadPolicy,
    /// Expected number of concurrently writing threads
    pub concurrency_level: usize,
    /// Lifespan applied to entries written without an explicit one
    pub default_lifespan: Option<Duration>,
    /// Max idle time applied to entries written without an explicit one
    pub default_max_idle: Option<Duration>,
    /// Background purge interval in seconds
    pub purge_interval: u64,
    /// Whether the statistics interceptor is installed
    pub statistics_enabled: bool,
    /// Whether the memory-usage interceptor is installed
    pub track_memory_usage: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries, 0 for unbounded (default: 1000)
    /// - `EVICTION_STRATEGY` - NONE, FIFO, UNORDERED, LRU or LIRS (default: LRU)
    /// - `EVICTION_THREAD_POLICY` - PIGGYBACK or DEFAULT (default: DEFAULT)
    /// - `CONCURRENCY_LEVEL` - Concurrency hint (default: 16)
    /// - `DEFAULT_LIFESPAN_MS` - Default lifespan, negative or absent for none
    /// - `DEFAULT_MAX_IDLE_MS` - Default max idle, negative or absent for none
    /// - `PURGE_INTERVAL` - Purge frequency in seconds (default: 5)
    /// - `STATISTICS_ENABLED` - true/false (default: true)
    /// - `TRACK_MEMORY_USAGE` - true/false (default: false)
    ///
    /// # Errors
    /// Returns a configuration error if the strategy or thread policy is not
    /// a recognized name. Malformed numbers fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable source.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |name: &str| lookup(name).and_then(|v| v.trim().parse::<i64>().ok());
        let flag = |name: &str| lookup(name).and_then(|v| v.trim().parse::<bool>().ok());
        let millis = |name: &str, fallback: Option<Duration>| match number(name) {
            Some(ms) if ms < 0 => None,
            Some(ms) => Some(Duration::from_millis(ms as u64)),
            None => fallback,
        };

        let eviction_strategy = match lookup("EVICTION_STRATEGY") {
            Some(name) => name.parse()?,
            None => defaults.eviction_strategy,
        };
        let thread_policy = match lookup("EVICTION_THREAD_POLICY") {
            Some(name) => name.parse()?,
            None => defaults.thread_policy,
        };

        Ok(Self {
            max_entries: number("MAX_ENTRIES")
                .filter(|n| *n >= 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.max_entries),
            eviction_strategy,
            thread_policy,
            concurrency_level: number("CONCURRENCY_LEVEL")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.concurrency_level),
            default_lifespan: millis("DEFAULT_LIFESPAN_MS", defaults.default_lifespan),
            default_max_idle: millis("DEFAULT_MAX_IDLE_MS", defaults.default_max_idle),
            purge_interval: number("PURGE_INTERVAL")
                .filter(|n| *n > 0)
                .map(|n| n as u64)
                .unwrap_or(defaults.purge_interval),
            statistics_enabled: flag("STATISTICS_ENABLED").unwrap_or(defaults.statistics_enabled),
            track_memory_usage: flag("TRACK_MEMORY_USAGE").unwrap_or(defaults.track_memory_usage),
        })
    }

    /// Returns true if the container enforces a maximum entry count.
    pub fn is_bounded(&self) -> bool {
        self.max_entries > 0
    }

    /// Returns an unbounded configuration with everything else defaulted.
    pub fn unbounded() -> Self {
        Self {
            max_entries: 0,
            eviction_strategy: EvictionStrategy::None,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            eviction_strategy: EvictionStrategy::Lru,
            thread_policy: EvictionThreadPolicy::Default,
            concurrency_level: 16,
            default_lifespan: None,
            default_max_idle: None,
            purge_interval: 5,
            statistics_enabled: true,
            track_memory_usage: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.eviction_strategy, EvictionStrategy::Lru);
        assert_eq!(config.thread_policy, EvictionThreadPolicy::Default);
        assert_eq!(config.concurrency_level, 16);
        assert_eq!(config.default_lifespan, None);
        assert_eq!(config.purge_interval, 5);
        assert!(config.statistics_enabled);
        assert!(!config.track_memory_usage);
        assert!(config.is_bounded());
    }

    #[test]
    fn test_config_from_lookup_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_from_lookup_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("MAX_ENTRIES", "50"),
            ("EVICTION_STRATEGY", "lirs"),
            ("EVICTION_THREAD_POLICY", "PIGGYBACK"),
            ("CONCURRENCY_LEVEL", "4"),
            ("DEFAULT_LIFESPAN_MS", "1500"),
            ("DEFAULT_MAX_IDLE_MS", "-1"),
            ("PURGE_INTERVAL", "2"),
            ("TRACK_MEMORY_USAGE", "true"),
        ]))
        .unwrap();

        assert_eq!(config.max_entries, 50);
        assert_eq!(config.eviction_strategy, EvictionStrategy::Lirs);
        assert_eq!(config.thread_policy, EvictionThreadPolicy::Piggyback);
        assert_eq!(config.concurrency_level, 4);
        assert_eq!(config.default_lifespan, Some(Duration::from_millis(1500)));
        assert_eq!(config.default_max_idle, None);
        assert_eq!(config.purge_interval, 2);
        assert!(config.track_memory_usage);
    }

    #[test]
    fn test_config_malformed_numbers_use_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("MAX_ENTRIES", "lots"),
            ("CONCURRENCY_LEVEL", "0"),
        ]))
        .unwrap();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.concurrency_level, 16);
    }

    #[test]
    fn test_config_unknown_strategy_rejected() {
        let result = Config::from_lookup(lookup_from(&[("EVICTION_STRATEGY", "RANDOM")]));
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_config_unknown_thread_policy_rejected() {
        let result = Config::from_lookup(lookup_from(&[("EVICTION_THREAD_POLICY", "DEDICATED")]));
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[test]
    fn test_config_unbounded() {
        let config = Config::unbounded();
        assert!(!config.is_bounded());
        assert_eq!(config.eviction_strategy, EvictionStrategy::None);
    }
}
