//! phpbb-acl - forum permission engine
//!
//! Resolves phpBB-style permissions: options granted to users and groups,
//! directly or through roles, per forum or globally, cached per user as a
//! packed base-36 bitstring in `user_permissions`.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - Row store trait, MongoDB and in-memory backends
//! - `cache` - Named caches with Moka
//! - `permissions` - Option registry, roles, grant aggregation, snapshots, queries
//! - `error` - Engine error type

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod permissions;

use std::sync::Arc;

use tracing::info;

pub use config::AclConfig;
pub use error::{AclError, Result};
pub use permissions::{AclChecker, AclProvider, Setting};

use cache::CacheRegistry;
use database::{AclStore, Database, MongoStore};

/// Build a checker over any store, with its own cache registry.
pub fn checker(store: Arc<dyn AclStore>, config: &AclConfig) -> AclChecker {
    let cache = CacheRegistry::new();
    AclChecker::new(AclProvider::new(store, &cache, config.snapshot_cache()))
}

/// Connect to MongoDB and build a checker over it.
pub async fn connect(config: &AclConfig) -> Result<AclChecker> {
    let uri = config.require_mongodb_uri()?;

    info!("Connecting to MongoDB...");
    let db = Database::connect(uri, &config.mongodb_database).await?;
    let store = MongoStore::new(&db, &config.table_prefix);
    info!("Using collection prefix {:?}", config.table_prefix);

    Ok(checker(Arc::new(store), config))
}
