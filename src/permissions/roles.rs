//! Role cache.
//!
//! Roles are reusable bundles of option settings. The whole table is
//! loaded at once and replaced at once; there is no per-role invalidation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::{AclStore, OptionId, RoleId};
use crate::error::Result;

use super::Setting;

/// Option settings of one role, ordered by option id.
pub type RoleOptions = BTreeMap<OptionId, Setting>;

/// Every role, keyed by role id.
pub type RoleTable = HashMap<RoleId, Arc<RoleOptions>>;

const CACHE_KEY: &str = "_role_cache";

#[derive(Clone)]
pub struct RoleCache {
    store: Arc<dyn AclStore>,
    cache: TypedCache<&'static str, Arc<RoleTable>>,
}

impl RoleCache {
    pub fn new(store: Arc<dyn AclStore>, cache: &CacheRegistry) -> Self {
        Self {
            store,
            cache: cache.get_or_create(CACHE_KEY, CacheConfig::process_wide()),
        }
    }

    /// Return the role table, building it on a cache miss.
    pub async fn load(&self) -> Result<Arc<RoleTable>> {
        self.cache.get_or_try_load(CACHE_KEY, || self.fetch()).await
    }

    /// Rebuild the role table from the store unconditionally.
    pub async fn reload(&self) -> Result<Arc<RoleTable>> {
        self.cache.invalidate(&CACHE_KEY);
        self.load().await
    }

    async fn fetch(&self) -> Result<Arc<RoleTable>> {
        let mut grouped: HashMap<RoleId, RoleOptions> = HashMap::new();
        for row in self.store.role_settings().await? {
            grouped
                .entry(row.role_id)
                .or_default()
                .insert(row.auth_option_id, row.auth_setting);
        }

        let roles: RoleTable = grouped
            .into_iter()
            .map(|(id, options)| (id, Arc::new(options)))
            .collect();
        debug!("Loaded {} acl roles", roles.len());

        Ok(Arc::new(roles))
    }

    /// Drop the cached table; the next `load` rebuilds it.
    pub fn invalidate(&self) {
        self.cache.invalidate(&CACHE_KEY);
    }
}
