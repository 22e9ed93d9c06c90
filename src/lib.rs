//! TTL Cache - A process-local in-memory key/value cache
//!
//! Entries carry their own time-to-live. Expired entries are hidden from
//! reads immediately and reclaimed by a cancellable background sweeper.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheStats, CacheStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_sweeper, SweeperHandle};
