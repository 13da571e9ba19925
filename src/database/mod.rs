//! Row-store collaborator for the permission engine.
//!
//! The engine never joins tables itself inside the store: every method
//! returns plain rows and the permission logic (role expansion, membership
//! rules, precedence) lives in `crate::permissions`. This keeps backends
//! thin and lets the in-memory store stand in for MongoDB in tests.

mod memory;
mod models;
mod mongo;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use models::*;
pub use mongo::{Database, MongoStore};

/// Optional restriction of a grant query.
///
/// `None` means "no restriction" for either dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantFilter {
    /// User ids for user grants, group ids for group grants.
    pub subjects: Option<Vec<u64>>,
    pub forums: Option<Vec<ForumId>>,
}

impl GrantFilter {
    /// Filter matching every grant.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching a single subject.
    pub fn subject(id: u64) -> Self {
        Self {
            subjects: Some(vec![id]),
            forums: None,
        }
    }

    #[must_use]
    pub fn subjects(mut self, ids: Option<Vec<u64>>) -> Self {
        self.subjects = ids;
        self
    }

    #[must_use]
    pub fn forums(mut self, ids: Option<Vec<ForumId>>) -> Self {
        self.forums = ids;
        self
    }

    /// Check whether a row passes the filter.
    pub fn matches(&self, subject: u64, forum_id: ForumId) -> bool {
        self.subjects.as_ref().is_none_or(|s| s.contains(&subject))
            && self.forums.as_ref().is_none_or(|f| f.contains(&forum_id))
    }
}

/// Backing store holding options, roles, grants, memberships, forums and
/// the per-user encoded snapshot.
///
/// Every failure is fatal to the caller: the engine cannot decide anything
/// without its store.
#[async_trait]
pub trait AclStore: Send + Sync {
    /// All options ordered by ascending option id.
    async fn options(&self) -> Result<Vec<AclOption>>;

    /// Role metadata ordered by ascending `role_order`.
    async fn roles(&self) -> Result<Vec<AclRole>>;

    /// All role settings ordered by ascending role id.
    async fn role_settings(&self) -> Result<Vec<RoleSetting>>;

    /// Grants assigned directly to users.
    async fn user_grants(&self, filter: &GrantFilter) -> Result<Vec<UserGrant>>;

    /// Grants assigned to groups.
    async fn group_grants(&self, filter: &GrantFilter) -> Result<Vec<GroupGrant>>;

    /// Memberships of the given users, or every membership when `None`.
    async fn memberships(&self, user_ids: Option<&[UserId]>) -> Result<Vec<UserGroup>>;

    /// Group rows for the given ids.
    async fn groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>>;

    /// Ids of every forum not listed in `exclude`.
    async fn forum_ids(&self, exclude: &[ForumId]) -> Result<Vec<ForumId>>;

    /// Load a user record.
    async fn user(&self, user_id: UserId) -> Result<Option<UserRecord>>;

    /// Persist an encoded snapshot and reset `user_perm_from`.
    async fn save_user_permissions(&self, user_id: UserId, permissions: &str) -> Result<()>;

    /// Blank the stored snapshot of the given users, or of everyone.
    async fn clear_user_permissions(&self, user_ids: Option<&[UserId]>) -> Result<()>;
}
