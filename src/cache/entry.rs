//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    /// The stored value
    pub(crate) value: V,
    /// Wall-clock time of the last write
    #[allow(dead_code)]
    pub(crate) created_at: DateTime<Utc>,
    /// Monotonic expiration instant, None = no expiration
    pub(crate) expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// A zero `ttl` produces an entry that never expires. A TTL too large to be
    /// represented as an `Instant` is treated the same way.
    pub(crate) fn new(value: V, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };

        Self {
            value,
            created_at: Utc::now(),
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired as of now.
    #[allow(dead_code)]
    pub(crate) fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks expiration against a caller-supplied instant.
    ///
    /// An entry is expired only when `now` is strictly after `expires_at`.
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now > expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    #[allow(dead_code)]
    pub(crate) fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }
}
