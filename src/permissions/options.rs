//! Option registry.
//!
//! Assigns every option a dense bit index inside the global and/or local
//! namespace. Indices follow ascending option id, so every user encoded
//! against the same registry uses the same bit layout. Adding or removing
//! an option shifts indices and makes every stored snapshot stale.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::{AclOption, AclStore, ForumId, OptionId};
use crate::error::Result;

/// Bits per packed chunk.
pub const CHUNK_BITS: usize = 31;

const CACHE_KEY: &str = "_acl_options";

/// Which namespace an option bit lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Local,
}

impl Scope {
    /// Line 0 holds global options, every other line a forum.
    #[inline]
    pub fn for_forum(forum_id: ForumId) -> Self {
        if forum_id == 0 { Self::Global } else { Self::Local }
    }
}

/// Name of the flag option for `name`: everything up to and including the
/// first underscore (`f_post` -> `f_`).
pub fn flag_name(name: &str) -> Option<&str> {
    name.find('_').map(|pos| &name[..=pos])
}

/// Bit layout of one namespace.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    index: HashMap<String, usize>,
    /// Bit index -> option id.
    options: Vec<OptionId>,
    /// Bit index -> bit index of its flag option in this namespace.
    parents: Vec<Option<usize>>,
}

impl Namespace {
    fn push(&mut self, option: &AclOption) {
        self.index.insert(option.auth_option.clone(), self.options.len());
        self.options.push(option.auth_option_id);
    }

    /// Resolve flag parents once the namespace is complete.
    fn link_parents(&mut self, names: &HashMap<OptionId, String>) {
        self.parents = self
            .options
            .iter()
            .enumerate()
            .map(|(idx, id)| {
                let name = names.get(id)?;
                let parent = *self.index.get(flag_name(name)?)?;
                (parent != idx).then_some(parent)
            })
            .collect();
    }

    /// Bit index of a named option.
    #[inline]
    pub fn bit(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Option ids in bit order.
    pub fn options(&self) -> &[OptionId] {
        &self.options
    }

    /// Bit index of the flag option for the option at `bit`.
    #[inline]
    pub fn parent(&self, bit: usize) -> Option<usize> {
        self.parents.get(bit).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Length of an encoded line: option count rounded up to whole chunks.
    pub fn padded_len(&self) -> usize {
        self.len().div_ceil(CHUNK_BITS) * CHUNK_BITS
    }
}

/// Snapshot of the option table.
#[derive(Debug, Clone, Default)]
pub struct AclOptions {
    global: Namespace,
    local: Namespace,
    ids: HashMap<String, OptionId>,
    names: HashMap<OptionId, String>,
    /// Option id -> id of its flag option.
    flags: HashMap<OptionId, OptionId>,
}

impl AclOptions {
    /// Build the registry from option rows sorted by ascending id.
    pub fn from_rows(rows: &[AclOption]) -> Self {
        let mut options = Self::default();

        for row in rows {
            if row.is_global {
                options.global.push(row);
            }
            if row.is_local {
                options.local.push(row);
            }
            options.ids.insert(row.auth_option.clone(), row.auth_option_id);
            options.names.insert(row.auth_option_id, row.auth_option.clone());
        }

        options.global.link_parents(&options.names);
        options.local.link_parents(&options.names);

        options.flags = options
            .names
            .iter()
            .filter_map(|(&id, name)| {
                let flag = *options.ids.get(flag_name(name)?)?;
                (flag != id).then_some((id, flag))
            })
            .collect();

        options
    }

    pub fn namespace(&self, scope: Scope) -> &Namespace {
        match scope {
            Scope::Global => &self.global,
            Scope::Local => &self.local,
        }
    }

    pub fn global(&self) -> &Namespace {
        &self.global
    }

    pub fn local(&self) -> &Namespace {
        &self.local
    }

    pub fn id(&self, name: &str) -> Option<OptionId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: OptionId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Id of the flag option guarding `id`.
    pub fn flag_of(&self, id: OptionId) -> Option<OptionId> {
        self.flags.get(&id).copied()
    }

    /// Iterate `(name, id)` of every registered option.
    pub fn iter(&self) -> impl Iterator<Item = (&str, OptionId)> {
        self.ids.iter().map(|(name, &id)| (name.as_str(), id))
    }
}

/// Cached, store-backed option registry.
#[derive(Clone)]
pub struct OptionRegistry {
    store: Arc<dyn AclStore>,
    cache: TypedCache<&'static str, Arc<AclOptions>>,
}

impl OptionRegistry {
    pub fn new(store: Arc<dyn AclStore>, cache: &CacheRegistry) -> Self {
        Self {
            store,
            cache: cache.get_or_create(CACHE_KEY, CacheConfig::process_wide()),
        }
    }

    /// Return the registry, querying the store on a cache miss.
    pub async fn load(&self) -> Result<Arc<AclOptions>> {
        self.cache.get_or_try_load(CACHE_KEY, || self.fetch()).await
    }

    async fn fetch(&self) -> Result<Arc<AclOptions>> {
        let rows = self.store.options().await?;
        let options = AclOptions::from_rows(&rows);
        debug!(
            "Loaded {} acl options ({} global, {} local)",
            rows.len(),
            options.global.len(),
            options.local.len()
        );
        Ok(Arc::new(options))
    }

    /// Drop the cached registry; the next `load` re-queries the store.
    pub fn invalidate(&self) {
        self.cache.invalidate(&CACHE_KEY);
        debug!("Invalidated acl option cache");
    }
}
