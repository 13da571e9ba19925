//! Grant rows for users and groups.

use serde::{Deserialize, Serialize};

use super::{ForumId, GroupId, OptionId, RoleId, UserId};
use crate::permissions::Setting;

/// A grant assigned directly to a user.
///
/// When `auth_role_id` is non-zero the row stands for every option in that
/// role and `auth_option_id`/`auth_setting` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrant {
    pub user_id: UserId,
    #[serde(default)]
    pub forum_id: ForumId,
    #[serde(default)]
    pub auth_option_id: OptionId,
    #[serde(default)]
    pub auth_role_id: RoleId,
    #[serde(default = "never")]
    pub auth_setting: Setting,
}

/// A grant assigned to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupGrant {
    pub group_id: GroupId,
    #[serde(default)]
    pub forum_id: ForumId,
    #[serde(default)]
    pub auth_option_id: OptionId,
    #[serde(default)]
    pub auth_role_id: RoleId,
    #[serde(default = "never")]
    pub auth_setting: Setting,
}

fn never() -> Setting {
    Setting::Never
}
