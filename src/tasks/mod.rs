//! Background Tasks Module
//!
//! # Tasks
//! - Expiration purge: sweeps expired entries at the configured interval

mod purge;

pub use purge::spawn_purge_task;
