//! Error types for the cache core
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for container construction and command execution.
///
/// Lookups for missing or expired keys are not errors; they return `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Rejected configuration, raised at construction time only
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A caller broke an operation's contract (missing key, double perform, re-entry)
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Mutation attempted through a read-only view
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl CacheError {
    /// Shorthand used by the read-only container views.
    pub(crate) fn read_only(operation: &str) -> Self {
        CacheError::Unsupported(format!("{} is not supported on a read-only view", operation))
    }
}

// == Measure Error ==
/// Failure reported by a size estimator.
///
/// Never propagated past the memory-usage interceptor, which falls back to
/// counting objects instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Size measurement unavailable: {0}")]
pub struct MeasureError(pub String);

// == Result Type Alias ==
/// Convenience Result type for the cache core.
pub type Result<T> = std::result::Result<T, CacheError>;
