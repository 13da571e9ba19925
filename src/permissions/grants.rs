//! Grant aggregation.
//!
//! Merges direct user grants, role assignments and group grants into a
//! single forum -> option -> setting map. Precedence:
//!
//! - direct user rows overwrite each other in row order;
//! - a user role only fills options not already set for that forum;
//! - group rows never overwrite a `Never`, and applying a `Never` drops a
//!   `Yes` on the option's flag so the encoder can recompute it from the
//!   remaining options.
//!
//! The reports at the bottom read the same tables without building a
//! snapshot and are keyed by option name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use super::options::{AclOptions, OptionRegistry, flag_name};
use super::pattern::OptionFilter;
use super::roles::{RoleCache, RoleTable};
use super::{RawAcl, Setting};
use crate::database::{
    AclStore, ForumId, GrantFilter, GroupId, OptionId, RoleId, UserGroup, UserId, UserRecord,
};
use crate::error::Result;

/// Option name -> setting.
pub type NamedSettings = BTreeMap<String, Setting>;

/// Subject id -> forum id -> option name -> setting.
pub type RawReport = BTreeMap<u64, BTreeMap<ForumId, NamedSettings>>;

/// Whose role assignments to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    User,
    Group,
}

/// Apply a group-sourced setting. An existing `Never` is never replaced.
fn merge_group_setting<K: Ord>(
    settings: &mut BTreeMap<K, Setting>,
    key: K,
    flag: Option<K>,
    setting: Setting,
) {
    if settings.get(&key).is_some_and(|s| s.is_never()) {
        return;
    }
    settings.insert(key, setting);

    if setting.is_never()
        && let Some(flag) = flag
        && settings.get(&flag).is_some_and(|s| s.is_yes())
    {
        settings.remove(&flag);
    }
}

/// Expand one grant row into `(option, setting)` pairs.
///
/// Returns `None` for a dangling role reference.
fn expand(
    roles: &RoleTable,
    role_id: RoleId,
    option_id: OptionId,
    setting: Setting,
) -> Option<Vec<(OptionId, Setting)>> {
    if role_id == 0 {
        return Some(vec![(option_id, setting)]);
    }
    match roles.get(&role_id) {
        Some(role) => Some(role.iter().map(|(&id, &s)| (id, s)).collect()),
        None => {
            warn!("Grant references unknown role {}", role_id);
            None
        }
    }
}

/// Name of an option when it passes the optional filter.
fn named<'a>(options: &'a AclOptions, filter: Option<&OptionFilter>, id: OptionId) -> Option<&'a str> {
    let name = options.name(id)?;
    filter.is_none_or(|f| f.matches(name)).then_some(name)
}

/// Builds raw permission data from grant rows.
#[derive(Clone)]
pub struct GrantAggregator {
    store: Arc<dyn AclStore>,
    options: OptionRegistry,
    roles: RoleCache,
}

impl GrantAggregator {
    pub fn new(store: Arc<dyn AclStore>, options: OptionRegistry, roles: RoleCache) -> Self {
        Self { store, options, roles }
    }

    /// Aggregated settings for one user, ready for encoding.
    ///
    /// Founders additionally get every global `a_` option.
    pub async fn aggregate(&self, user: &UserRecord) -> Result<RawAcl> {
        let mut hold = self.raw_single_user(user.user_id).await?;

        if user.is_founder() {
            let options = self.options.load().await?;
            for &id in options.global().options() {
                if options.name(id).is_some_and(|name| name.starts_with("a_")) {
                    hold.entry(0).or_default().insert(id, Setting::Yes);
                }
            }
            debug!("Founder {} granted all admin options", user.user_id);
        }

        Ok(hold)
    }

    /// Aggregated settings for one user keyed by option id, without the
    /// founder override.
    pub async fn raw_single_user(&self, user_id: UserId) -> Result<RawAcl> {
        let options = self.options.load().await?;
        let roles = self.roles.load().await?;
        let mut hold = RawAcl::new();

        for grant in self.store.user_grants(&GrantFilter::subject(user_id)).await? {
            if grant.auth_role_id == 0 {
                hold.entry(grant.forum_id)
                    .or_default()
                    .insert(grant.auth_option_id, grant.auth_setting);
                continue;
            }
            let Some(role) = roles.get(&grant.auth_role_id) else {
                warn!("User {} references unknown role {}", user_id, grant.auth_role_id);
                continue;
            };
            let forum = hold.entry(grant.forum_id).or_default();
            for (&id, &setting) in role.iter() {
                forum.entry(id).or_insert(setting);
            }
        }

        let groups: Vec<u64> = self
            .effective_memberships(Some(&[user_id]))
            .await?
            .iter()
            .map(|m| u64::from(m.group_id))
            .collect();

        if !groups.is_empty() {
            let filter = GrantFilter::all().subjects(Some(groups));
            for grant in self.store.group_grants(&filter).await? {
                let Some(settings) =
                    expand(&roles, grant.auth_role_id, grant.auth_option_id, grant.auth_setting)
                else {
                    continue;
                };
                let forum = hold.entry(grant.forum_id).or_default();
                for (id, setting) in settings {
                    merge_group_setting(forum, id, options.flag_of(id), setting);
                }
            }
        }

        Ok(hold)
    }

    /// Memberships that confer permissions: approved, and not the leader
    /// of a group whose leaders skip its permissions.
    async fn effective_memberships(&self, user_ids: Option<&[UserId]>) -> Result<Vec<UserGroup>> {
        let memberships = self.store.memberships(user_ids).await?;
        if memberships.is_empty() {
            return Ok(memberships);
        }

        let mut group_ids: Vec<GroupId> = memberships.iter().map(|m| m.group_id).collect();
        group_ids.sort_unstable();
        group_ids.dedup();

        let groups: HashMap<GroupId, bool> = self
            .store
            .groups(&group_ids)
            .await?
            .into_iter()
            .map(|g| (g.group_id, g.group_skip_auth))
            .collect();

        Ok(memberships
            .into_iter()
            .filter(|m| !m.user_pending)
            .filter(|m| match groups.get(&m.group_id) {
                Some(&skip_auth) => !(m.group_leader && skip_auth),
                None => false,
            })
            .collect())
    }

    /// Combined user and group settings per user, keyed by option name.
    ///
    /// Flags are not recomputed here, so a flag granted by a group may be
    /// listed although every option under it is `Never` for the user.
    pub async fn raw_data(
        &self,
        user_ids: Option<&[UserId]>,
        filter: Option<&OptionFilter>,
        forum_ids: Option<&[ForumId]>,
    ) -> Result<RawReport> {
        let mut hold = self.user_raw_data(user_ids, filter, forum_ids).await?;

        let options = self.options.load().await?;
        let roles = self.roles.load().await?;

        let mut members: HashMap<GroupId, Vec<UserId>> = HashMap::new();
        for m in self.effective_memberships(user_ids).await? {
            members.entry(m.group_id).or_default().push(m.user_id);
        }
        if members.is_empty() {
            return Ok(hold);
        }

        let grant_filter = GrantFilter::all()
            .subjects(Some(members.keys().map(|&id| u64::from(id)).collect()))
            .forums(forum_ids.map(<[ForumId]>::to_vec));
        let rows = self.store.group_grants(&grant_filter).await?;

        // direct rows first, then role rows
        let ordered = rows
            .iter()
            .filter(|g| g.auth_role_id == 0)
            .chain(rows.iter().filter(|g| g.auth_role_id != 0));

        for grant in ordered {
            let Some(settings) =
                expand(&roles, grant.auth_role_id, grant.auth_option_id, grant.auth_setting)
            else {
                continue;
            };
            let Some(users) = members.get(&grant.group_id) else {
                continue;
            };

            for &user_id in users {
                let forum = hold.entry(user_id).or_default().entry(grant.forum_id).or_default();
                for &(id, setting) in &settings {
                    let Some(name) = named(&options, filter, id) else {
                        continue;
                    };
                    let flag = flag_name(name).map(str::to_string);
                    merge_group_setting(forum, name.to_string(), flag, setting);
                }
            }
        }

        hold.retain(|_, forums| {
            forums.retain(|_, settings| !settings.is_empty());
            !forums.is_empty()
        });
        Ok(hold)
    }

    /// Settings granted directly to users (including user roles).
    pub async fn user_raw_data(
        &self,
        user_ids: Option<&[UserId]>,
        filter: Option<&OptionFilter>,
        forum_ids: Option<&[ForumId]>,
    ) -> Result<RawReport> {
        let grant_filter = GrantFilter::all()
            .subjects(user_ids.map(<[UserId]>::to_vec))
            .forums(forum_ids.map(<[ForumId]>::to_vec));
        let rows = self.store.user_grants(&grant_filter).await?;

        let rows = rows
            .iter()
            .map(|g| (g.user_id, g.forum_id, g.auth_role_id, g.auth_option_id, g.auth_setting));
        self.collect_report(rows, filter).await
    }

    /// Settings granted to groups (including group roles), keyed by group id.
    pub async fn group_raw_data(
        &self,
        group_ids: Option<&[GroupId]>,
        filter: Option<&OptionFilter>,
        forum_ids: Option<&[ForumId]>,
    ) -> Result<RawReport> {
        let grant_filter = GrantFilter::all()
            .subjects(group_ids.map(|ids| ids.iter().map(|&id| u64::from(id)).collect()))
            .forums(forum_ids.map(<[ForumId]>::to_vec));
        let rows = self.store.group_grants(&grant_filter).await?;

        let rows = rows.iter().map(|g| {
            (u64::from(g.group_id), g.forum_id, g.auth_role_id, g.auth_option_id, g.auth_setting)
        });
        self.collect_report(rows, filter).await
    }

    /// Fold `(subject, forum, role, option, setting)` rows into a report,
    /// direct rows first, later rows overwriting earlier ones.
    async fn collect_report<I>(&self, rows: I, filter: Option<&OptionFilter>) -> Result<RawReport>
    where
        I: Iterator<Item = (u64, ForumId, RoleId, OptionId, Setting)> + Clone,
    {
        let options = self.options.load().await?;
        let roles = self.roles.load().await?;
        let mut hold = RawReport::new();

        let direct = rows.clone().filter(|r| r.2 == 0);
        let by_role = rows.filter(|r| r.2 != 0);

        for (subject, forum_id, role_id, option_id, setting) in direct.chain(by_role) {
            let Some(settings) = expand(&roles, role_id, option_id, setting) else {
                continue;
            };
            for (id, setting) in settings {
                if let Some(name) = named(&options, filter, id) {
                    hold.entry(subject)
                        .or_default()
                        .entry(forum_id)
                        .or_default()
                        .insert(name.to_string(), setting);
                }
            }
        }

        Ok(hold)
    }

    /// Roles assigned to users or groups, per subject and forum.
    ///
    /// Only roles of `role_type` are listed. When a subject holds several
    /// roles in one forum the one with the highest `role_order` wins.
    pub async fn role_data(
        &self,
        kind: SubjectKind,
        role_type: &str,
        subject_ids: Option<&[u64]>,
        forum_ids: Option<&[ForumId]>,
    ) -> Result<BTreeMap<u64, BTreeMap<ForumId, RoleId>>> {
        let order: HashMap<RoleId, u32> = self
            .store
            .roles()
            .await?
            .into_iter()
            .filter(|r| r.role_type == role_type)
            .map(|r| (r.role_id, r.role_order))
            .collect();

        let grant_filter = GrantFilter::all()
            .subjects(subject_ids.map(<[u64]>::to_vec))
            .forums(forum_ids.map(<[ForumId]>::to_vec));

        let mut rows: Vec<(u32, u64, ForumId, RoleId)> = match kind {
            SubjectKind::User => self
                .store
                .user_grants(&grant_filter)
                .await?
                .into_iter()
                .filter_map(|g| {
                    let rank = *order.get(&g.auth_role_id)?;
                    Some((rank, g.user_id, g.forum_id, g.auth_role_id))
                })
                .collect(),
            SubjectKind::Group => self
                .store
                .group_grants(&grant_filter)
                .await?
                .into_iter()
                .filter_map(|g| {
                    let rank = *order.get(&g.auth_role_id)?;
                    Some((rank, u64::from(g.group_id), g.forum_id, g.auth_role_id))
                })
                .collect(),
        };
        rows.sort_by_key(|r| r.0);

        let mut assigned: BTreeMap<u64, BTreeMap<ForumId, RoleId>> = BTreeMap::new();
        for (_, subject, forum_id, role_id) in rows {
            assigned.entry(subject).or_default().insert(forum_id, role_id);
        }
        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRegistry;
    use crate::database::{MemoryStore, UserType};

    const A_: OptionId = 1;
    const A_BOARD: OptionId = 2;
    const A_USER: OptionId = 3;
    const F_: OptionId = 4;
    const F_POST: OptionId = 5;
    const F_READ: OptionId = 6;

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_option(A_, "a_", true, false);
        store.add_option(A_BOARD, "a_board", true, false);
        store.add_option(A_USER, "a_user", true, false);
        store.add_option(F_, "f_", false, true);
        store.add_option(F_POST, "f_post", false, true);
        store.add_option(F_READ, "f_read", false, true);
        store.add_user(UserRecord::new(2, "founder", UserType::Founder));
        store.add_user(UserRecord::new(3, "alice", UserType::Normal));
        store.add_user(UserRecord::new(4, "bob", UserType::Normal));
        store.add_group(10, "REGISTERED", false);
        store.add_group(11, "MODERATORS", true);
        store
    }

    fn aggregator(store: Arc<MemoryStore>) -> GrantAggregator {
        let cache = CacheRegistry::new();
        let store: Arc<dyn AclStore> = store;
        let options = OptionRegistry::new(store.clone(), &cache);
        let roles = RoleCache::new(store.clone(), &cache);
        GrantAggregator::new(store, options, roles)
    }

    #[tokio::test]
    async fn test_no_grants_is_empty() {
        let agg = aggregator(store());
        assert!(agg.raw_single_user(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_rows_last_write_wins() {
        let store = store();
        store.grant_user(3, 5, F_POST, Setting::Yes);
        store.grant_user(3, 5, F_POST, Setting::Never);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert_eq!(hold[&5][&F_POST], Setting::Never);
    }

    #[tokio::test]
    async fn test_user_role_fills_only_missing_options() {
        let store = store();
        store.set_role_option(20, F_POST, Setting::Yes);
        store.set_role_option(20, F_READ, Setting::Yes);
        store.grant_user(3, 5, F_POST, Setting::Never);
        store.grant_user_role(3, 5, 20);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert_eq!(hold[&5][&F_POST], Setting::Never);
        assert_eq!(hold[&5][&F_READ], Setting::Yes);
    }

    #[tokio::test]
    async fn test_unknown_role_is_ignored() {
        let store = store();
        store.grant_user_role(3, 5, 99);
        store.add_member(10, 3, false, false);
        store.grant_group_role(10, 6, 99);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert!(!hold.contains_key(&5));
        assert!(!hold.contains_key(&6));
    }

    #[tokio::test]
    async fn test_never_sticky_against_group_yes() {
        let store = store();
        store.grant_user(3, 5, F_POST, Setting::Never);
        store.add_member(10, 3, false, false);
        store.grant_group(10, 5, F_POST, Setting::Yes);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert_eq!(hold[&5][&F_POST], Setting::Never);
    }

    #[tokio::test]
    async fn test_group_overrides_non_never() {
        let store = store();
        store.grant_user(3, 5, F_POST, Setting::Yes);
        store.add_member(10, 3, false, false);
        store.grant_group(10, 5, F_POST, Setting::Never);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert_eq!(hold[&5][&F_POST], Setting::Never);
    }

    #[tokio::test]
    async fn test_group_never_drops_flag_yes() {
        let store = store();
        store.grant_user(3, 5, F_, Setting::Yes);
        store.add_member(10, 3, false, false);
        store.grant_group(10, 5, F_POST, Setting::Never);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert!(!hold[&5].contains_key(&F_));
        assert_eq!(hold[&5][&F_POST], Setting::Never);
    }

    #[tokio::test]
    async fn test_group_never_sticky_across_groups() {
        let store = store();
        store.add_member(10, 3, false, false);
        store.add_member(11, 3, false, false);
        store.grant_group(10, 5, F_POST, Setting::Never);
        store.grant_group(11, 5, F_POST, Setting::Yes);
        store.grant_group(11, 5, F_READ, Setting::Yes);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert_eq!(hold[&5][&F_POST], Setting::Never);
        assert_eq!(hold[&5][&F_READ], Setting::Yes);
    }

    #[tokio::test]
    async fn test_group_role_never_drops_flag_yes() {
        let store = store();
        store.set_role_option(22, F_POST, Setting::Never);
        store.grant_user(3, 5, F_, Setting::Yes);
        store.add_member(10, 3, false, false);
        store.grant_group_role(10, 5, 22);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert!(!hold[&5].contains_key(&F_));
        assert_eq!(hold[&5][&F_POST], Setting::Never);
    }

    #[tokio::test]
    async fn test_group_role_expansion() {
        let store = store();
        store.set_role_option(21, F_READ, Setting::Yes);
        store.set_role_option(21, F_POST, Setting::Yes);
        store.add_member(10, 3, false, false);
        store.grant_group_role(10, 7, 21);
        let hold = aggregator(store).raw_single_user(3).await.unwrap();

        assert_eq!(hold[&7][&F_READ], Setting::Yes);
        assert_eq!(hold[&7][&F_POST], Setting::Yes);
    }

    #[tokio::test]
    async fn test_pending_and_skip_auth_leaders_excluded() {
        let store = store();
        store.add_member(10, 3, false, true);
        store.add_member(11, 3, true, false);
        store.add_member(11, 4, false, false);
        store.grant_group(10, 0, A_BOARD, Setting::Yes);
        store.grant_group(11, 0, A_USER, Setting::Yes);
        let agg = aggregator(store);

        assert!(agg.raw_single_user(3).await.unwrap().is_empty());
        assert_eq!(agg.raw_single_user(4).await.unwrap()[&0][&A_USER], Setting::Yes);

        let members = agg.effective_memberships(Some(&[3, 4])).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!((members[0].group_id, members[0].user_id), (11, 4));
    }

    #[tokio::test]
    async fn test_founder_gets_admin_options() {
        let store = store();
        store.grant_user(2, 0, A_BOARD, Setting::Never);
        let agg = aggregator(store.clone());

        let founder = store.user(2).await.unwrap().unwrap();
        let hold = agg.aggregate(&founder).await.unwrap();
        assert_eq!(hold[&0][&A_], Setting::Yes);
        assert_eq!(hold[&0][&A_BOARD], Setting::Yes);
        assert_eq!(hold[&0][&A_USER], Setting::Yes);

        let alice = store.user(3).await.unwrap().unwrap();
        assert!(agg.aggregate(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_founder_without_admin_options_gets_no_global_line() {
        let store = Arc::new(MemoryStore::new());
        store.add_option(1, "f_", false, true);
        store.add_option(2, "f_read", false, true);
        store.add_user(UserRecord::new(2, "founder", UserType::Founder));
        store.grant_user(2, 4, 2, Setting::Yes);
        let agg = aggregator(store.clone());

        let founder = store.user(2).await.unwrap().unwrap();
        let hold = agg.aggregate(&founder).await.unwrap();
        assert!(!hold.contains_key(&0));
        assert_eq!(hold[&4][&2], Setting::Yes);
    }

    #[tokio::test]
    async fn test_raw_data_by_name_with_filters() {
        let store = store();
        store.grant_user(3, 5, F_POST, Setting::Yes);
        store.grant_user(4, 5, F_READ, Setting::Yes);
        store.grant_user(4, 6, F_READ, Setting::Yes);
        store.add_member(10, 3, false, false);
        store.grant_group(10, 5, F_READ, Setting::Yes);
        let agg = aggregator(store);

        let all = agg.raw_data(None, None, None).await.unwrap();
        assert_eq!(all[&3][&5]["f_post"], Setting::Yes);
        assert_eq!(all[&3][&5]["f_read"], Setting::Yes);
        assert_eq!(all[&4][&6]["f_read"], Setting::Yes);

        let filter = OptionFilter::new(["f_read"]);
        let report = agg.raw_data(Some(&[3, 4]), Some(&filter), Some(&[5])).await.unwrap();
        assert!(!report[&3][&5].contains_key("f_post"));
        assert_eq!(report[&3][&5]["f_read"], Setting::Yes);
        assert!(!report[&4].contains_key(&6));
    }

    #[tokio::test]
    async fn test_raw_data_never_sticky_and_flag_drop() {
        let store = store();
        store.grant_user(3, 5, F_, Setting::Yes);
        store.grant_user(3, 5, F_READ, Setting::Never);
        store.add_member(10, 3, false, false);
        store.grant_group(10, 5, F_READ, Setting::Yes);
        store.grant_group(10, 5, F_POST, Setting::Never);
        let report = aggregator(store).raw_data(Some(&[3]), None, None).await.unwrap();

        assert_eq!(report[&3][&5]["f_read"], Setting::Never);
        assert!(!report[&3][&5].contains_key("f_"));
    }

    #[tokio::test]
    async fn test_user_and_group_raw_data() {
        let store = store();
        store.set_role_option(20, F_READ, Setting::Yes);
        store.grant_user_role(3, 5, 20);
        store.grant_user(3, 5, F_READ, Setting::Never);
        store.grant_group(10, 0, A_BOARD, Setting::Yes);
        store.grant_group_role(11, 8, 20);
        let agg = aggregator(store);

        // role rows are applied after direct rows
        let users = agg.user_raw_data(Some(&[3]), None, None).await.unwrap();
        assert_eq!(users[&3][&5]["f_read"], Setting::Yes);

        let groups = agg.group_raw_data(None, None, None).await.unwrap();
        assert_eq!(groups[&10][&0]["a_board"], Setting::Yes);
        assert_eq!(groups[&11][&8]["f_read"], Setting::Yes);

        let filter = OptionFilter::new(["a_%"]);
        let admins = agg.group_raw_data(Some(&[10, 11]), Some(&filter), None).await.unwrap();
        assert!(admins.contains_key(&10));
        assert!(!admins.contains_key(&11));
    }

    #[tokio::test]
    async fn test_role_data_ordered_by_role_order() {
        let store = store();
        store.add_role(20, "ROLE_FORUM_STANDARD", "f_", 2);
        store.add_role(21, "ROLE_FORUM_FULL", "f_", 1);
        store.add_role(22, "ROLE_ADMIN_FULL", "a_", 1);
        store.grant_user_role(3, 5, 20);
        store.grant_user_role(3, 5, 21);
        store.grant_user_role(3, 0, 22);
        store.grant_group_role(10, 6, 21);
        let agg = aggregator(store);

        let users = agg.role_data(SubjectKind::User, "f_", None, None).await.unwrap();
        assert_eq!(users[&3][&5], 20);
        assert!(!users[&3].contains_key(&0));

        let groups = agg
            .role_data(SubjectKind::Group, "f_", Some(&[10]), Some(&[6]))
            .await
            .unwrap();
        assert_eq!(groups[&10][&6], 21);
    }
}
