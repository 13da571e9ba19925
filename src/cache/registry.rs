//! Cache registry - Central management for all caches.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::{CacheConfig, TypedCache};

/// Registry of named, typed caches.
///
/// Asking twice for the same name returns handles to the same underlying
/// cache, so components that share a name share entries.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

/// Internal cache entry storing type-erased cache.
struct CacheEntry {
    cache: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl CacheEntry {
    /// Downcast to the requested cache type.
    ///
    /// # Panics
    /// Panics if the cache was registered with different key/value types.
    fn typed<K, V>(&self, name: &str) -> TypedCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        match self.cache.downcast_ref::<TypedCache<K, V>>() {
            Some(cache) => cache.clone(),
            None => panic!(
                "Cache '{}' type mismatch: expected {}, got {}",
                name,
                std::any::type_name::<TypedCache<K, V>>(),
                self.type_name
            ),
        }
    }
}

impl CacheRegistry {
    /// Create a new empty cache registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an existing cache by name.
    ///
    /// # Panics
    /// Panics if the cache exists but with different types.
    pub fn get<K, V>(&self, name: &str) -> Option<TypedCache<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.caches.read().get(name).map(|entry| entry.typed(name))
    }

    /// Get an existing cache or create a new one if it doesn't exist.
    ///
    /// The config is only used when the cache is created.
    pub fn get_or_create<K, V>(&self, name: &str, config: CacheConfig) -> TypedCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mut caches = self.caches.write();

        if let Some(existing) = caches.get(name) {
            return existing.typed(name);
        }

        debug!("Creating cache: {}", name);

        let cache = TypedCache::new(name, config);
        caches.insert(
            name.to_string(),
            CacheEntry {
                cache: Box::new(cache.clone()),
                type_name: std::any::type_name::<TypedCache<K, V>>(),
            },
        );

        cache
    }

    /// Check if a cache with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.caches.read().contains_key(name)
    }

    /// Get a list of all registered cache names.
    pub fn cache_names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caches = self.caches.read();
        f.debug_struct("CacheRegistry")
            .field("cache_count", &caches.len())
            .field("cache_names", &caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_shares_entries() {
        let registry = CacheRegistry::new();
        let a: TypedCache<u64, String> = registry.get_or_create("users", CacheConfig::default());
        let b: TypedCache<u64, String> = registry.get_or_create("users", CacheConfig::default());

        a.insert(1, "alice".to_string());
        assert_eq!(b.get(&1).as_deref(), Some("alice"));
        assert!(registry.contains("users"));
        assert_eq!(registry.cache_names(), vec!["users".to_string()]);
    }

    #[test]
    fn test_independent_registries() {
        let first = CacheRegistry::new();
        let second = CacheRegistry::new();
        let a: TypedCache<u64, u64> = first.get_or_create("n", CacheConfig::process_wide());
        let b: TypedCache<u64, u64> = second.get_or_create("n", CacheConfig::process_wide());

        a.insert(1, 1);
        assert!(b.get(&1).is_none());
    }

    #[test]
    #[should_panic(expected = "type mismatch")]
    fn test_type_mismatch_panics() {
        let registry = CacheRegistry::new();
        let _: TypedCache<u64, String> = registry.get_or_create("users", CacheConfig::default());
        let _: Option<TypedCache<u64, u64>> = registry.get("users");
    }
}
