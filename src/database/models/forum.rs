//! Forum row (only the columns the engine reads).

use serde::{Deserialize, Serialize};

use super::ForumId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forum {
    pub forum_id: ForumId,
    #[serde(default)]
    pub forum_name: String,
}
