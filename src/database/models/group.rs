//! Groups and group membership.

use serde::{Deserialize, Serialize};

use super::{GroupId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: GroupId,
    #[serde(default)]
    pub group_name: String,
    /// Leaders of such a group do not inherit its permissions.
    #[serde(default)]
    pub group_skip_auth: bool,
}

/// Membership of a user in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub group_id: GroupId,
    pub user_id: UserId,
    #[serde(default)]
    pub group_leader: bool,
    #[serde(default)]
    pub user_pending: bool,
}
