//! User record as seen by the permission engine.

use serde::{Deserialize, Serialize};

use super::UserId;

/// Account type of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum UserType {
    #[default]
    Normal,
    Inactive,
    Ignore,
    /// Founders always hold every global `a_` option.
    Founder,
}

impl From<i32> for UserType {
    fn from(raw: i32) -> Self {
        match raw {
            1 => Self::Inactive,
            2 => Self::Ignore,
            3 => Self::Founder,
            _ => Self::Normal,
        }
    }
}

impl From<UserType> for i32 {
    fn from(user_type: UserType) -> Self {
        match user_type {
            UserType::Normal => 0,
            UserType::Inactive => 1,
            UserType::Ignore => 2,
            UserType::Founder => 3,
        }
    }
}

/// The user columns owned by the permission engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_type: UserType,
    /// Encoded permission snapshot; empty means "not computed".
    #[serde(default)]
    pub user_permissions: String,
    /// Id of the user whose permissions are being viewed; reset on rebuild.
    #[serde(default)]
    pub user_perm_from: UserId,
}

impl UserRecord {
    pub fn new(user_id: UserId, username: impl Into<String>, user_type: UserType) -> Self {
        Self {
            user_id,
            username: username.into(),
            user_type,
            user_permissions: String::new(),
            user_perm_from: 0,
        }
    }

    #[inline]
    pub fn is_founder(&self) -> bool {
        self.user_type == UserType::Founder
    }
}
