//! Configuration module.
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::error::{AclError, Result};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclConfig {
    // MongoDB
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,

    /// Prefix of every collection name (`phpbb_acl_options`, ...).
    pub table_prefix: String,

    // Decoded snapshot cache
    pub snapshot_cache_capacity: u64,
    pub snapshot_ttl: Duration,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: None,
            mongodb_database: "phpbb".to_string(),
            table_prefix: "phpbb_".to_string(),
            snapshot_cache_capacity: 10_000,
            snapshot_ttl: Duration::from_secs(300),
        }
    }
}

/// Parse a numeric variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AclError::Config(format!("{key} must be a number, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}

impl AclConfig {
    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            mongodb_uri: env::var("MONGODB_URI").ok().filter(|s| !s.is_empty()),
            mongodb_database: env::var("MONGODB_DATABASE").unwrap_or(defaults.mongodb_database),
            table_prefix: env::var("ACL_TABLE_PREFIX").unwrap_or(defaults.table_prefix),
            snapshot_cache_capacity: parse_var(
                "ACL_SNAPSHOT_CACHE_CAPACITY",
                defaults.snapshot_cache_capacity,
            )?,
            snapshot_ttl: Duration::from_secs(parse_var(
                "ACL_SNAPSHOT_TTL_SECS",
                defaults.snapshot_ttl.as_secs(),
            )?),
        })
    }

    /// MongoDB URI, required by anything that talks to the database.
    pub fn require_mongodb_uri(&self) -> Result<&str> {
        self.mongodb_uri
            .as_deref()
            .ok_or_else(|| AclError::Config("MONGODB_URI must be set".to_string()))
    }

    /// Cache settings for decoded per-user snapshots.
    pub fn snapshot_cache(&self) -> CacheConfig {
        CacheConfig::with_capacity(self.snapshot_cache_capacity).ttl(self.snapshot_ttl)
    }
}
