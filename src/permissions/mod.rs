//! Forum permission engine.
//!
//! Grants (per user, per group, or via roles) are aggregated into one
//! tri-state setting per option and forum, packed into a compact text
//! snapshot stored on the user row, and answered from the decoded snapshot.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let acl = AclChecker::new(AclProvider::new(store, &cache, CacheConfig::default()));
//!
//! if acl.get(user_id, "f_post", forum_id).await? {
//!     // ...
//! }
//!
//! // after changing grants, roles or options
//! acl.provider().clear_prefetch(Some(&[user_id])).await?;
//! ```

mod bitstring;
mod checker;
mod grants;
mod options;
mod pattern;
mod provider;
mod roles;
mod setting;

use std::collections::BTreeMap;

use crate::database::{ForumId, OptionId};

pub use bitstring::{AclSnapshot, ForumBits, encode};
pub use checker::{AclChecker, PermissionList};
pub use grants::{GrantAggregator, NamedSettings, RawReport, SubjectKind};
pub use options::{AclOptions, Namespace, OptionRegistry, Scope};
pub use pattern::OptionFilter;
pub use provider::AclProvider;
pub use roles::{RoleCache, RoleOptions, RoleTable};
pub use setting::Setting;

/// Option id -> setting for one forum (or the global scope).
pub type ForumSettings = BTreeMap<OptionId, Setting>;

/// Forum id -> settings. Forum 0 is the global scope.
pub type RawAcl = BTreeMap<ForumId, ForumSettings>;
