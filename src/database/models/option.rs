//! Permission option row.

use serde::{Deserialize, Serialize};

use super::OptionId;

/// One row of the option table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclOption {
    pub auth_option_id: OptionId,
    /// Option name such as `a_board` or `f_post`.
    pub auth_option: String,
    #[serde(default)]
    pub is_global: bool,
    #[serde(default)]
    pub is_local: bool,
}

impl AclOption {
    pub fn new(id: OptionId, name: impl Into<String>, is_global: bool, is_local: bool) -> Self {
        Self {
            auth_option_id: id,
            auth_option: name.into(),
            is_global,
            is_local,
        }
    }
}
