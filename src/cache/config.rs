//! Cache configuration.

use std::time::Duration;

/// Configuration for a cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,

    /// Time-to-live for cache entries.
    /// After this duration, entries are automatically evicted.
    pub ttl: Option<Duration>,

    /// Time-to-idle for cache entries.
    /// Entries are evicted if not accessed within this duration.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)), // 5 minutes
            tti: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with the given max capacity.
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    /// Set time-to-live for cache entries.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    /// Process-wide tables (option registry, role cache).
    /// One entry each, only dropped by explicit invalidation.
    pub fn process_wide() -> Self {
        Self {
            max_capacity: 16,
            ttl: None,
            tti: None,
        }
    }

    /// Per-user forum listings used by negated forum queries.
    /// Low capacity, short TTL since forums come and go.
    pub fn forum_lists() -> Self {
        Self {
            max_capacity: 2_000,
            ttl: Some(Duration::from_secs(120)), // 2 minutes
            tti: Some(Duration::from_secs(60)),  // 1 minute idle
        }
    }
}
