//! Cache module - the cache-store collaborator of the permission engine.
//!
//! The option registry and role cache memoize whole tables here, and the
//! snapshot provider keeps decoded per-user snapshots. Every engine owns
//! its own [`CacheRegistry`], so two engines in one process never share
//! state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = CacheRegistry::new();
//! let snapshots = registry.get_or_create::<u64, Arc<AclSnapshot>>("acl_snapshots", CacheConfig::default());
//!
//! snapshots.insert(user_id, acl);
//! let acl = snapshots.get(&user_id);
//! ```

mod config;
mod registry;
mod typed;

pub use config::CacheConfig;
pub use registry::CacheRegistry;
pub use typed::TypedCache;
