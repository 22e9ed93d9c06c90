//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the lifetime of a cache.
//!
//! # Tasks
//! - Sweeper: Removes expired cache entries at the configured interval

mod sweeper;

pub use sweeper::{spawn_sweeper, SweeperHandle};
