//! MongoDB-backed row store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::{Client, Collection, options::ClientOptions};
use tracing::{debug, info};

use super::{
    AclOption, AclRole, AclStore, Forum, ForumId, Group, GroupGrant, GroupId, GrantFilter,
    RoleSetting, UserGrant, UserGroup, UserId, UserRecord,
};

/// Database wrapper for MongoDB operations.
#[derive(Debug, Clone)]
pub struct Database {
    db: mongodb::Database,
}

impl Database {
    /// Connect to MongoDB with the given URI and database name.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Successfully connected to MongoDB");

        let db = client.database(db_name);

        Ok(Self { db })
    }

    /// Get a typed collection from the database.
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}

/// Row store over the forum collections.
///
/// Collection names are the table names with the configured prefix,
/// e.g. `phpbb_acl_options`.
#[derive(Debug, Clone)]
pub struct MongoStore {
    options: Collection<AclOption>,
    roles: Collection<AclRole>,
    roles_data: Collection<RoleSetting>,
    acl_users: Collection<UserGrant>,
    acl_groups: Collection<GroupGrant>,
    user_group: Collection<UserGroup>,
    groups: Collection<Group>,
    forums: Collection<Forum>,
    users: Collection<UserRecord>,
}

impl MongoStore {
    pub fn new(db: &Database, prefix: &str) -> Self {
        let name = |table: &str| format!("{prefix}{table}");

        Self {
            options: db.collection(&name("acl_options")),
            roles: db.collection(&name("acl_roles")),
            roles_data: db.collection(&name("acl_roles_data")),
            acl_users: db.collection(&name("acl_users")),
            acl_groups: db.collection(&name("acl_groups")),
            user_group: db.collection(&name("user_group")),
            groups: db.collection(&name("groups")),
            forums: db.collection(&name("forums")),
            users: db.collection(&name("users")),
        }
    }
}

/// BSON has no unsigned 64-bit integer.
fn bson_id(id: u64) -> Result<i64> {
    i64::try_from(id).with_context(|| format!("id {id} does not fit a BSON int64"))
}

/// Build a `$in` clause over numeric ids.
fn in_set(ids: &[u64]) -> Result<Document> {
    let ids = ids.iter().map(|&id| bson_id(id)).collect::<Result<Vec<i64>>>()?;
    Ok(doc! { "$in": ids })
}

fn forum_set(ids: &[ForumId]) -> Document {
    let ids: Vec<i64> = ids.iter().map(|&id| i64::from(id)).collect();
    doc! { "$in": ids }
}

/// Translate a grant filter into a query on `subject_field`.
fn grant_query(subject_field: &str, filter: &GrantFilter) -> Result<Document> {
    let mut query = Document::new();
    if let Some(subjects) = &filter.subjects {
        query.insert(subject_field, in_set(subjects)?);
    }
    if let Some(forums) = &filter.forums {
        query.insert("forum_id", forum_set(forums));
    }
    Ok(query)
}

#[async_trait]
impl AclStore for MongoStore {
    async fn options(&self) -> Result<Vec<AclOption>> {
        let rows = self
            .options
            .find(doc! {})
            .sort(doc! { "auth_option_id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn roles(&self) -> Result<Vec<AclRole>> {
        let rows = self
            .roles
            .find(doc! {})
            .sort(doc! { "role_order": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn role_settings(&self) -> Result<Vec<RoleSetting>> {
        let rows = self
            .roles_data
            .find(doc! {})
            .sort(doc! { "role_id": 1, "auth_option_id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn user_grants(&self, filter: &GrantFilter) -> Result<Vec<UserGrant>> {
        let rows: Vec<UserGrant> = self
            .acl_users
            .find(grant_query("user_id", filter)?)
            .await?
            .try_collect()
            .await?;
        debug!("DB user grants: {} rows", rows.len());
        Ok(rows)
    }

    async fn group_grants(&self, filter: &GrantFilter) -> Result<Vec<GroupGrant>> {
        let rows: Vec<GroupGrant> = self
            .acl_groups
            .find(grant_query("group_id", filter)?)
            .await?
            .try_collect()
            .await?;
        debug!("DB group grants: {} rows", rows.len());
        Ok(rows)
    }

    async fn memberships(&self, user_ids: Option<&[UserId]>) -> Result<Vec<UserGroup>> {
        let query = match user_ids {
            Some(ids) => {
                let ids = in_set(ids)?;
                doc! { "user_id": ids }
            }
            None => doc! {},
        };
        let rows = self.user_group.find(query).await?.try_collect().await?;
        Ok(rows)
    }

    async fn groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>> {
        let ids: Vec<i64> = group_ids.iter().map(|&id| i64::from(id)).collect();
        let rows = self
            .groups
            .find(doc! { "group_id": { "$in": ids } })
            .await?
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn forum_ids(&self, exclude: &[ForumId]) -> Result<Vec<ForumId>> {
        let query = if exclude.is_empty() {
            doc! {}
        } else {
            let ids: Vec<i64> = exclude.iter().map(|&id| i64::from(id)).collect();
            doc! { "forum_id": { "$nin": ids } }
        };
        let forums: Vec<Forum> = self.forums.find(query).await?.try_collect().await?;
        Ok(forums.into_iter().map(|f| f.forum_id).collect())
    }

    async fn user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        let id = bson_id(user_id)?;
        let filter = doc! { "user_id": id };
        let result = self.users.find_one(filter).await?;
        debug!("DB get user {}: {:?}", user_id, result.is_some());
        Ok(result)
    }

    async fn save_user_permissions(&self, user_id: UserId, permissions: &str) -> Result<()> {
        let id = bson_id(user_id)?;
        let filter = doc! { "user_id": id };
        let update = doc! { "$set": { "user_permissions": permissions, "user_perm_from": 0_i64 } };

        self.users.update_one(filter, update).await?;
        debug!("Saved permissions for user {}", user_id);
        Ok(())
    }

    async fn clear_user_permissions(&self, user_ids: Option<&[UserId]>) -> Result<()> {
        let filter = match user_ids {
            Some(ids) => {
                let ids = in_set(ids)?;
                doc! { "user_id": ids }
            }
            None => doc! {},
        };
        let update = doc! { "$set": { "user_permissions": "", "user_perm_from": 0_i64 } };

        let result = self.users.update_many(filter, update).await?;
        debug!("Cleared permissions for {} users", result.modified_count);
        Ok(())
    }
}
