//! Permission queries.

use std::collections::BTreeMap;

use tracing::debug;

use super::bitstring::AclSnapshot;
use super::grants::{NamedSettings, RawReport};
use super::options::AclOptions;
use super::pattern::OptionFilter;
use super::provider::AclProvider;
use crate::database::{ForumId, UserId};
use crate::error::Result;

/// Forum id -> option name -> users holding it.
pub type PermissionList = BTreeMap<ForumId, BTreeMap<String, Vec<UserId>>>;

/// Split a leading `!` off an option name.
#[inline]
fn split_negation(option: &str) -> (bool, &str) {
    match option.strip_prefix('!') {
        Some(name) => (true, name),
        None => (false, option),
    }
}

/// Global bit OR'd with the forum's local bit. Options registered in
/// neither namespace resolve to `false`.
fn resolve(snapshot: &AclSnapshot, options: &AclOptions, name: &str, forum_id: ForumId) -> bool {
    let global = options
        .global()
        .bit(name)
        .and_then(|bit| snapshot.bit(0, bit))
        .unwrap_or(false);

    let local = forum_id != 0
        && options
            .local()
            .bit(name)
            .and_then(|bit| snapshot.bit(forum_id, bit))
            .unwrap_or(false);

    global || local
}

/// Answers permission questions from the users' snapshots.
///
/// Clones share the provider's caches.
#[derive(Clone)]
pub struct AclChecker {
    provider: AclProvider,
}

impl AclChecker {
    pub fn new(provider: AclProvider) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &AclProvider {
        &self.provider
    }

    /// Check one option. `forum_id` 0 checks the global scope only.
    ///
    /// A leading `!` inverts the result.
    pub async fn get(&self, user_id: UserId, option: &str, forum_id: ForumId) -> Result<bool> {
        let (negate, name) = split_negation(option);
        let snapshot = self.provider.get_acl(user_id).await?;
        let options = self.provider.options().load().await?;

        Ok(resolve(&snapshot, &options, name, forum_id) != negate)
    }

    /// True if any of the options is held.
    pub async fn get_any(&self, user_id: UserId, options: &[&str], forum_id: ForumId) -> Result<bool> {
        for option in options {
            if self.get(user_id, option, forum_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Per-forum result of a local option.
    ///
    /// Only forums with a snapshot line are evaluated. For `!option` every
    /// forum without a line is reported as `true` as well. With `clean`
    /// only `true` entries are returned.
    pub async fn get_for_forums(
        &self,
        user_id: UserId,
        option: &str,
        clean: bool,
    ) -> Result<BTreeMap<ForumId, bool>> {
        let (negate, name) = split_negation(option);
        let mut forums = BTreeMap::new();

        let missing = if negate {
            Some(self.provider.user_forum_ids(user_id).await?)
        } else {
            None
        };

        let options = self.provider.options().load().await?;
        if options.local().contains(name) {
            let snapshot = self.provider.get_acl(user_id).await?;
            for forum_id in snapshot.local_forum_ids() {
                let value = resolve(&snapshot, &options, name, forum_id) != negate;
                if value || !clean {
                    forums.insert(forum_id, value);
                }
            }
        }

        if let Some(missing) = missing {
            for &forum_id in missing.iter() {
                forums.insert(forum_id, true);
            }
        }

        Ok(forums)
    }

    /// True if any option is held anywhere: globally for global options,
    /// in at least one forum for local ones.
    pub async fn get_global_any(&self, user_id: UserId, options: &[&str]) -> Result<bool> {
        let snapshot = self.provider.get_acl(user_id).await?;
        let registry = self.provider.options().load().await?;

        for &name in options {
            let global = registry.global().contains(name) && resolve(&snapshot, &registry, name, 0);
            let held = global
                || (registry.local().contains(name)
                    && snapshot
                        .local_forum_ids()
                        .any(|forum_id| resolve(&snapshot, &registry, name, forum_id)));

            if held {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Which users hold which options in which forums, read straight from
    /// grants.
    ///
    /// Flags are listed as granted without being recomputed, so a user can
    /// appear under `a_` while every `a_*` option is `Never` for them.
    pub async fn get_list(
        &self,
        user_ids: Option<&[UserId]>,
        options: Option<&OptionFilter>,
        forum_ids: Option<&[ForumId]>,
    ) -> Result<PermissionList> {
        let hold = match (user_ids, options, forum_ids) {
            (Some(&[user_id]), None, None) => self.single_user_report(user_id).await?,
            _ => {
                self.provider
                    .grants()
                    .raw_data(user_ids, options, forum_ids)
                    .await?
            }
        };

        let mut list = PermissionList::new();
        for (user_id, forums) in hold {
            for (forum_id, settings) in forums {
                for (name, setting) in settings {
                    if setting.is_yes() {
                        list.entry(forum_id).or_default().entry(name).or_default().push(user_id);
                    }
                }
            }
        }

        debug!("Permission list covers {} forums", list.len());
        Ok(list)
    }

    async fn single_user_report(&self, user_id: UserId) -> Result<RawReport> {
        let raw = self.provider.grants().raw_single_user(user_id).await?;
        let options = self.provider.options().load().await?;

        let forums: BTreeMap<ForumId, NamedSettings> = raw
            .into_iter()
            .map(|(forum_id, settings)| {
                let named = settings
                    .into_iter()
                    .filter_map(|(id, setting)| Some((options.name(id)?.to_string(), setting)))
                    .collect();
                (forum_id, named)
            })
            .collect();

        Ok(RawReport::from([(user_id, forums)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheRegistry};
    use crate::database::{MemoryStore, OptionId, UserRecord, UserType};
    use crate::permissions::Setting;
    use std::sync::Arc;

    const A_: OptionId = 1;
    const A_FOO: OptionId = 2;
    const A_BAR: OptionId = 3;
    const F_: OptionId = 4;
    const F_POST: OptionId = 5;
    const F_READ: OptionId = 6;
    const M_: OptionId = 7;
    const M_EDIT: OptionId = 8;

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_option(A_, "a_", true, false);
        store.add_option(A_FOO, "a_foo", true, false);
        store.add_option(A_BAR, "a_bar", true, false);
        store.add_option(F_, "f_", false, true);
        store.add_option(F_POST, "f_post", false, true);
        store.add_option(F_READ, "f_read", false, true);
        store.add_option(M_, "m_", true, true);
        store.add_option(M_EDIT, "m_edit", true, true);
        store.add_user(UserRecord::new(2, "founder", UserType::Founder));
        store.add_user(UserRecord::new(3, "alice", UserType::Normal));
        store.add_user(UserRecord::new(4, "bob", UserType::Normal));
        for (id, name) in [(1, "General"), (2, "Support"), (5, "News"), (7, "Archive")] {
            store.add_forum(id, name);
        }
        store.add_group(10, "REGISTERED", false);
        store
    }

    fn checker(store: Arc<MemoryStore>) -> AclChecker {
        AclChecker::new(AclProvider::new(store, &CacheRegistry::new(), CacheConfig::default()))
    }

    #[tokio::test]
    async fn test_two_global_options() {
        let store = Arc::new(MemoryStore::new());
        store.add_option(1, "a_foo", true, false);
        store.add_option(2, "a_bar", true, false);
        store.add_user(UserRecord::new(3, "alice", UserType::Normal));
        store.grant_user(3, 0, 1, Setting::Yes);
        let acl = checker(store.clone());

        assert!(acl.get(3, "a_foo", 0).await.unwrap());
        assert!(!acl.get(3, "a_bar", 0).await.unwrap());
        assert_eq!(store.stored_permissions(3).unwrap(), "hra0hs");
    }

    #[tokio::test]
    async fn test_negation() {
        let store = store();
        store.grant_user(3, 0, A_FOO, Setting::Yes);
        let acl = checker(store);

        for option in ["a_foo", "a_bar"] {
            let held = acl.get(3, option, 0).await.unwrap();
            let negated = acl.get(3, &format!("!{option}"), 0).await.unwrap();
            assert_eq!(negated, !held);
        }
    }

    #[tokio::test]
    async fn test_unregistered_option() {
        let acl = checker(store());
        assert!(!acl.get(3, "x_unknown", 0).await.unwrap());
        assert!(acl.get(3, "!x_unknown", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_flag_implied_by_child() {
        let store = store();
        store.grant_user(3, 0, A_BAR, Setting::Yes);
        store.grant_user(3, 5, F_READ, Setting::Yes);
        let acl = checker(store);

        assert!(acl.get(3, "a_", 0).await.unwrap());
        assert!(acl.get(3, "f_", 5).await.unwrap());
        assert!(!acl.get(3, "f_", 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_global_or_local() {
        let store = store();
        store.grant_user(3, 0, M_EDIT, Setting::Yes);
        store.grant_user(4, 5, M_EDIT, Setting::Yes);
        let acl = checker(store);

        // global grant counts in every forum
        assert!(acl.get(3, "m_edit", 0).await.unwrap());
        assert!(acl.get(3, "m_edit", 7).await.unwrap());
        // local grant only in its forum, never globally
        assert!(acl.get(4, "m_edit", 5).await.unwrap());
        assert!(!acl.get(4, "m_edit", 0).await.unwrap());
        assert!(!acl.get(4, "m_edit", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_never_beats_group_yes() {
        let store = store();
        store.grant_user(3, 5, F_POST, Setting::Never);
        store.add_member(10, 3, false, false);
        store.grant_group(10, 5, F_POST, Setting::Yes);
        store.grant_group(10, 5, F_READ, Setting::Yes);
        let acl = checker(store);

        assert!(!acl.get(3, "f_post", 5).await.unwrap());
        assert!(acl.get(3, "f_read", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_founder_holds_admin_options() {
        let store = store();
        let acl = checker(store);

        for option in ["a_", "a_foo", "a_bar"] {
            assert!(acl.get(2, option, 0).await.unwrap());
        }
        assert!(!acl.get(2, "m_edit", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_prefetch_applies_grant_change() {
        let store = store();
        store.grant_user(3, 5, F_POST, Setting::Yes);
        let acl = checker(store.clone());
        assert!(acl.get(3, "f_post", 5).await.unwrap());

        store.revoke_all();
        store.grant_user(3, 5, F_POST, Setting::Never);
        acl.provider().clear_prefetch(Some(&[3])).await.unwrap();

        assert!(!acl.get(3, "f_post", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_any() {
        let store = store();
        store.grant_user(3, 5, F_READ, Setting::Yes);
        let acl = checker(store);

        assert!(acl.get_any(3, &["f_post", "f_read"], 5).await.unwrap());
        assert!(!acl.get_any(3, &["f_post", "a_foo"], 5).await.unwrap());
        assert!(!acl.get_any(3, &[], 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_for_forums() {
        let store = store();
        store.grant_user(3, 1, F_POST, Setting::Yes);
        store.grant_user(3, 2, F_READ, Setting::Yes);
        let acl = checker(store);

        let forums = acl.get_for_forums(3, "f_post", false).await.unwrap();
        assert_eq!(forums, BTreeMap::from([(1, true), (2, false)]));

        let clean = acl.get_for_forums(3, "f_post", true).await.unwrap();
        assert_eq!(clean, BTreeMap::from([(1, true)]));

        // forums without a line are reported for negated queries
        let negated = acl.get_for_forums(3, "!f_post", true).await.unwrap();
        assert_eq!(negated, BTreeMap::from([(2, true), (5, true), (7, true)]));

        assert!(acl.get_for_forums(3, "a_foo", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_global_any() {
        let store = store();
        store.grant_user(3, 2, F_READ, Setting::Yes);
        store.grant_user(4, 0, A_FOO, Setting::Yes);
        let acl = checker(store);

        assert!(acl.get_global_any(3, &["f_read"]).await.unwrap());
        assert!(!acl.get_global_any(3, &["f_post", "a_foo"]).await.unwrap());
        assert!(acl.get_global_any(4, &["f_post", "a_foo"]).await.unwrap());
        assert!(!acl.get_global_any(4, &["!a_foo"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_global_any_counts_global_grant_of_local_option() {
        let store = store();
        store.grant_user(3, 0, M_EDIT, Setting::Yes);
        store.grant_user(4, 5, M_EDIT, Setting::Yes);
        let acl = checker(store);

        assert!(acl.get(3, "m_edit", 0).await.unwrap());
        assert!(acl.get_global_any(3, &["m_edit"]).await.unwrap());
        assert!(acl.get_global_any(4, &["m_edit"]).await.unwrap());
        assert!(!acl.get_global_any(2, &["m_edit"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_list() {
        let store = store();
        store.grant_user(3, 5, F_POST, Setting::Yes);
        store.grant_user(4, 5, F_POST, Setting::Yes);
        store.grant_user(4, 5, F_READ, Setting::No);
        store.add_member(10, 3, false, false);
        store.grant_group(10, 7, F_READ, Setting::Yes);
        let acl = checker(store);

        let list = acl.get_list(None, None, None).await.unwrap();
        assert_eq!(list[&5]["f_post"], vec![3, 4]);
        assert!(!list[&5].contains_key("f_read"));
        assert_eq!(list[&7]["f_read"], vec![3]);

        let filter = OptionFilter::new(["f_read"]);
        let filtered = acl.get_list(None, Some(&filter), None).await.unwrap();
        assert!(!filtered.contains_key(&5));
        assert_eq!(filtered[&7]["f_read"], vec![3]);

        let single = acl.get_list(Some(&[3]), None, None).await.unwrap();
        assert_eq!(single[&5]["f_post"], vec![3]);
        assert_eq!(single[&7]["f_read"], vec![3]);
    }
}
