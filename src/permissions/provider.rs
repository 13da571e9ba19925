//! Per-user snapshot provider.
//!
//! The stored `user_permissions` text is the source of truth and is read on
//! every lookup, so a snapshot cleared by another engine takes effect at
//! once. When it is missing or was encoded against a different option
//! layout it is rebuilt from grants. Decoded snapshots are memoized by their
//! encoded text.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::bitstring::{AclSnapshot, encode};
use super::grants::GrantAggregator;
use super::options::{AclOptions, OptionRegistry, Scope};
use super::roles::RoleCache;
use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::{AclStore, ForumId, UserId, UserRecord};
use crate::error::Result;

#[derive(Clone)]
pub struct AclProvider {
    store: Arc<dyn AclStore>,
    options: OptionRegistry,
    roles: RoleCache,
    grants: GrantAggregator,
    /// Encoded text -> decoded snapshot.
    snapshots: TypedCache<String, Arc<AclSnapshot>>,
    /// Encoded text -> forums without a line in it.
    forum_ids: TypedCache<String, Arc<Vec<ForumId>>>,
}

impl AclProvider {
    pub fn new(store: Arc<dyn AclStore>, cache: &CacheRegistry, snapshots: CacheConfig) -> Self {
        let options = OptionRegistry::new(store.clone(), cache);
        let roles = RoleCache::new(store.clone(), cache);
        let grants = GrantAggregator::new(store.clone(), options.clone(), roles.clone());

        Self {
            store,
            options,
            roles,
            grants,
            snapshots: cache.get_or_create("acl_snapshots", snapshots),
            forum_ids: cache.get_or_create("acl_forum_ids", CacheConfig::forum_lists()),
        }
    }

    pub fn options(&self) -> &OptionRegistry {
        &self.options
    }

    pub fn grants(&self) -> &GrantAggregator {
        &self.grants
    }

    /// Bit index of an option in one namespace.
    pub async fn option_bit(&self, scope: Scope, name: &str) -> Result<Option<usize>> {
        Ok(self.options.load().await?.namespace(scope).bit(name))
    }

    pub async fn has_option(&self, scope: Scope, name: &str) -> Result<bool> {
        Ok(self.option_bit(scope, name).await?.is_some())
    }

    /// Decoded snapshot of a user.
    ///
    /// Unknown users get an empty snapshot, which denies everything.
    pub async fn get_acl(&self, user_id: UserId) -> Result<Arc<AclSnapshot>> {
        let (_, snapshot) = self.load_acls(user_id).await?;
        Ok(snapshot)
    }

    /// Current encoded text of a user and its decoded form. The text is
    /// empty whenever the snapshot is.
    async fn load_acls(&self, user_id: UserId) -> Result<(String, Arc<AclSnapshot>)> {
        let options = self.options.load().await?;

        let Some(user) = self.store.user(user_id).await? else {
            warn!("Permission lookup for unknown user {}", user_id);
            return Ok((String::new(), Arc::default()));
        };

        if !user.user_permissions.trim().is_empty() {
            let snapshot = self.decode(&user.user_permissions);
            if snapshot.matches_layout(&options) {
                return Ok((user.user_permissions, snapshot));
            }
            info!("Permission snapshot of user {} is stale, rebuilding", user_id);
        }

        let encoded = self.rebuild(&user, &options).await?;
        let snapshot = self.decode(&encoded);
        if snapshot.matches_layout(&options) {
            Ok((encoded, snapshot))
        } else {
            warn!("Rebuilt snapshot of user {} still mismatches the option layout", user_id);
            Ok((String::new(), Arc::default()))
        }
    }

    fn decode(&self, encoded: &str) -> Arc<AclSnapshot> {
        self.snapshots
            .get_or_insert_with(encoded.to_string(), || Arc::new(AclSnapshot::decode(encoded)))
    }

    /// Aggregate, encode and persist a user's snapshot.
    ///
    /// Nothing is written when the user holds no grants at all.
    async fn rebuild(&self, user: &UserRecord, options: &AclOptions) -> Result<String> {
        let raw = self.grants.aggregate(user).await?;
        let encoded = encode(&raw, options);

        if encoded.is_empty() {
            debug!("User {} has no permissions to store", user.user_id);
        } else {
            self.store.save_user_permissions(user.user_id, &encoded).await?;
            debug!("Stored permission snapshot for user {}", user.user_id);
        }

        Ok(encoded)
    }

    /// Ids of every forum the user's snapshot has no line for.
    pub async fn user_forum_ids(&self, user_id: UserId) -> Result<Arc<Vec<ForumId>>> {
        let (encoded, snapshot) = self.load_acls(user_id).await?;
        self.forum_ids
            .get_or_try_load(encoded, || self.missing_forums(&snapshot))
            .await
    }

    async fn missing_forums(&self, snapshot: &AclSnapshot) -> Result<Arc<Vec<ForumId>>> {
        let known: Vec<ForumId> = snapshot.forum_ids().collect();
        Ok(Arc::new(self.store.forum_ids(&known).await?))
    }

    /// Blank the stored snapshots of the given users, or of every user, and
    /// reload roles and options.
    ///
    /// Must be called after any change to grants, roles or options.
    pub async fn clear_prefetch(&self, user_ids: Option<&[UserId]>) -> Result<()> {
        self.options.invalidate();
        self.roles.reload().await?;
        self.store.clear_user_permissions(user_ids).await?;
        self.forum_ids.invalidate_all();

        match user_ids {
            Some(ids) => info!("Cleared permission snapshots of {} users", ids.len()),
            None => info!("Cleared all permission snapshots"),
        }

        Ok(())
    }
}
