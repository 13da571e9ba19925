//! Row models for the permission tables.
//!
//! Field names follow the column names of the forum schema so existing
//! exports can be loaded without renaming.

pub mod forum;
pub mod grant;
pub mod group;
pub mod option;
pub mod role;
pub mod user;

pub use forum::Forum;
pub use grant::{GroupGrant, UserGrant};
pub use group::{Group, UserGroup};
pub use option::AclOption;
pub use role::{AclRole, RoleSetting};
pub use user::{UserRecord, UserType};

/// Forum identifier. `0` addresses the global scope.
pub type ForumId = u32;
/// Permission option identifier.
pub type OptionId = u32;
/// Role identifier. `0` in a grant row means "no role".
pub type RoleId = u32;
/// Group identifier.
pub type GroupId = u32;
/// User identifier.
pub type UserId = u64;
