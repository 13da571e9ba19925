//! In-memory row store.
//!
//! Tables are plain vectors kept in insertion order, so grant rows come
//! back in the order they were added. Used by tests and by embedders that
//! keep permission data elsewhere.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    AclOption, AclRole, AclStore, Forum, ForumId, Group, GroupGrant, GroupId, GrantFilter,
    OptionId, RoleId, RoleSetting, UserGrant, UserGroup, UserId, UserRecord,
};
use crate::permissions::Setting;

#[derive(Debug, Default)]
struct Tables {
    options: Vec<AclOption>,
    roles: Vec<AclRole>,
    role_settings: Vec<RoleSetting>,
    user_grants: Vec<UserGrant>,
    group_grants: Vec<GroupGrant>,
    memberships: Vec<UserGroup>,
    groups: Vec<Group>,
    forums: Vec<Forum>,
    users: Vec<UserRecord>,
}

/// Thread-safe in-memory implementation of [`AclStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    permission_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_option(&self, id: OptionId, name: &str, is_global: bool, is_local: bool) {
        self.tables
            .write()
            .options
            .push(AclOption::new(id, name, is_global, is_local));
    }

    pub fn add_role(&self, role_id: RoleId, name: &str, role_type: &str, role_order: u32) {
        self.tables.write().roles.push(AclRole {
            role_id,
            role_name: name.to_string(),
            role_description: String::new(),
            role_type: role_type.to_string(),
            role_order,
        });
    }

    pub fn set_role_option(&self, role_id: RoleId, option_id: OptionId, setting: Setting) {
        let mut tables = self.tables.write();
        tables
            .role_settings
            .retain(|r| !(r.role_id == role_id && r.auth_option_id == option_id));
        tables.role_settings.push(RoleSetting {
            role_id,
            auth_option_id: option_id,
            auth_setting: setting,
        });
    }

    /// Grant a single option to a user.
    pub fn grant_user(&self, user_id: UserId, forum_id: ForumId, option_id: OptionId, setting: Setting) {
        self.tables.write().user_grants.push(UserGrant {
            user_id,
            forum_id,
            auth_option_id: option_id,
            auth_role_id: 0,
            auth_setting: setting,
        });
    }

    /// Assign a role to a user.
    pub fn grant_user_role(&self, user_id: UserId, forum_id: ForumId, role_id: RoleId) {
        self.tables.write().user_grants.push(UserGrant {
            user_id,
            forum_id,
            auth_option_id: 0,
            auth_role_id: role_id,
            auth_setting: Setting::Never,
        });
    }

    /// Grant a single option to a group.
    pub fn grant_group(&self, group_id: GroupId, forum_id: ForumId, option_id: OptionId, setting: Setting) {
        self.tables.write().group_grants.push(GroupGrant {
            group_id,
            forum_id,
            auth_option_id: option_id,
            auth_role_id: 0,
            auth_setting: setting,
        });
    }

    /// Assign a role to a group.
    pub fn grant_group_role(&self, group_id: GroupId, forum_id: ForumId, role_id: RoleId) {
        self.tables.write().group_grants.push(GroupGrant {
            group_id,
            forum_id,
            auth_option_id: 0,
            auth_role_id: role_id,
            auth_setting: Setting::Never,
        });
    }

    /// Drop every user and group grant.
    pub fn revoke_all(&self) {
        let mut tables = self.tables.write();
        tables.user_grants.clear();
        tables.group_grants.clear();
    }

    pub fn add_group(&self, group_id: GroupId, name: &str, skip_auth: bool) {
        self.tables.write().groups.push(Group {
            group_id,
            group_name: name.to_string(),
            group_skip_auth: skip_auth,
        });
    }

    pub fn add_member(&self, group_id: GroupId, user_id: UserId, leader: bool, pending: bool) {
        self.tables.write().memberships.push(UserGroup {
            group_id,
            user_id,
            group_leader: leader,
            user_pending: pending,
        });
    }

    pub fn add_forum(&self, forum_id: ForumId, name: &str) {
        self.tables.write().forums.push(Forum {
            forum_id,
            forum_name: name.to_string(),
        });
    }

    pub fn add_user(&self, user: UserRecord) {
        let mut tables = self.tables.write();
        tables.users.retain(|u| u.user_id != user.user_id);
        tables.users.push(user);
    }

    /// Stored snapshot of a user, if the user exists.
    pub fn stored_permissions(&self, user_id: UserId) -> Option<String> {
        self.tables
            .read()
            .users
            .iter()
            .find(|u| u.user_id == user_id)
            .map(|u| u.user_permissions.clone())
    }

    /// Number of snapshot writes performed through [`AclStore::save_user_permissions`].
    pub fn permission_writes(&self) -> usize {
        self.permission_writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AclStore for MemoryStore {
    async fn options(&self) -> Result<Vec<AclOption>> {
        let mut rows = self.tables.read().options.clone();
        rows.sort_by_key(|o| o.auth_option_id);
        Ok(rows)
    }

    async fn roles(&self) -> Result<Vec<AclRole>> {
        let mut rows = self.tables.read().roles.clone();
        rows.sort_by_key(|r| r.role_order);
        Ok(rows)
    }

    async fn role_settings(&self) -> Result<Vec<RoleSetting>> {
        let mut rows = self.tables.read().role_settings.clone();
        rows.sort_by_key(|r| (r.role_id, r.auth_option_id));
        Ok(rows)
    }

    async fn user_grants(&self, filter: &GrantFilter) -> Result<Vec<UserGrant>> {
        Ok(self
            .tables
            .read()
            .user_grants
            .iter()
            .filter(|g| filter.matches(g.user_id, g.forum_id))
            .copied()
            .collect())
    }

    async fn group_grants(&self, filter: &GrantFilter) -> Result<Vec<GroupGrant>> {
        Ok(self
            .tables
            .read()
            .group_grants
            .iter()
            .filter(|g| filter.matches(u64::from(g.group_id), g.forum_id))
            .copied()
            .collect())
    }

    async fn memberships(&self, user_ids: Option<&[UserId]>) -> Result<Vec<UserGroup>> {
        Ok(self
            .tables
            .read()
            .memberships
            .iter()
            .filter(|m| user_ids.is_none_or(|ids| ids.contains(&m.user_id)))
            .copied()
            .collect())
    }

    async fn groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>> {
        Ok(self
            .tables
            .read()
            .groups
            .iter()
            .filter(|g| group_ids.contains(&g.group_id))
            .cloned()
            .collect())
    }

    async fn forum_ids(&self, exclude: &[ForumId]) -> Result<Vec<ForumId>> {
        Ok(self
            .tables
            .read()
            .forums
            .iter()
            .map(|f| f.forum_id)
            .filter(|id| !exclude.contains(id))
            .collect())
    }

    async fn user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        Ok(self
            .tables
            .read()
            .users
            .iter()
            .find(|u| u.user_id == user_id)
            .cloned())
    }

    async fn save_user_permissions(&self, user_id: UserId, permissions: &str) -> Result<()> {
        let mut tables = self.tables.write();
        if let Some(user) = tables.users.iter_mut().find(|u| u.user_id == user_id) {
            user.user_permissions = permissions.to_string();
            user.user_perm_from = 0;
        }
        self.permission_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn clear_user_permissions(&self, user_ids: Option<&[UserId]>) -> Result<()> {
        let mut tables = self.tables.write();
        for user in tables
            .users
            .iter_mut()
            .filter(|u| user_ids.is_none_or(|ids| ids.contains(&u.user_id)))
        {
            user.user_permissions.clear();
            user.user_perm_from = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::UserType;

    #[tokio::test]
    async fn test_options_sorted_by_id() {
        let store = MemoryStore::new();
        store.add_option(5, "a_bar", true, false);
        store.add_option(2, "a_", true, false);

        let ids: Vec<_> = store.options().await.unwrap().iter().map(|o| o.auth_option_id).collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[tokio::test]
    async fn test_save_and_clear_permissions() {
        let store = MemoryStore::new();
        store.add_user(UserRecord::new(2, "admin", UserType::Founder));
        store.add_user(UserRecord::new(3, "alice", UserType::Normal));

        store.save_user_permissions(2, "abc").await.unwrap();
        store.save_user_permissions(3, "def").await.unwrap();
        assert_eq!(store.permission_writes(), 2);

        store.clear_user_permissions(Some(&[3])).await.unwrap();
        assert_eq!(store.stored_permissions(2).as_deref(), Some("abc"));
        assert_eq!(store.stored_permissions(3).as_deref(), Some(""));

        store.clear_user_permissions(None).await.unwrap();
        assert_eq!(store.stored_permissions(2).as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_forum_ids_exclude() {
        let store = MemoryStore::new();
        store.add_forum(1, "General");
        store.add_forum(2, "News");
        store.add_forum(5, "Archive");

        assert_eq!(store.forum_ids(&[0, 2]).await.unwrap(), vec![1, 5]);
    }
}
