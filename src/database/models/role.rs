//! Role definition rows.

use serde::{Deserialize, Serialize};

use super::{OptionId, RoleId};
use crate::permissions::Setting;

/// Role metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRole {
    pub role_id: RoleId,
    pub role_name: String,
    #[serde(default)]
    pub role_description: String,
    /// Option prefix the role applies to (`a_`, `m_`, `u_`, `f_`).
    pub role_type: String,
    #[serde(default)]
    pub role_order: u32,
}

/// One option setting inside a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSetting {
    pub role_id: RoleId,
    pub auth_option_id: OptionId,
    pub auth_setting: Setting,
}
