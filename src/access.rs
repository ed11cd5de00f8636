//! Access control and rule lookup used to scope history reads.
//!
//! Both are collaborators owned by the host application. The in-memory
//! implementations here back the binary and the tests.

use std::collections::{HashMap, HashSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::{AlertRule, Identity};
use crate::error::HistorianError;

/// A rule folder (namespace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Folder UID.
    pub uid: String,
    /// Display title.
    pub title: String,
}

/// Decides which rule folders an identity may read.
#[async_trait]
pub trait AccessControl: Send + Sync + fmt::Debug {
    /// Returns `true` if the identity may read every rule of its organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the permission check itself fails.
    async fn can_read_all_rules(&self, identity: &Identity) -> Result<bool, HistorianError>;

    /// Fails unless the identity may read rules in `rule`'s folder.
    ///
    /// # Errors
    ///
    /// Returns [`HistorianError::Unauthorized`] if access is denied.
    async fn authorize_access_in_folder(
        &self,
        identity: &Identity,
        rule: &AlertRule,
    ) -> Result<(), HistorianError>;

    /// Returns `true` if the identity may read rules in `folder`.
    ///
    /// # Errors
    ///
    /// Returns an error if the permission check itself fails.
    async fn has_access_in_folder(
        &self,
        identity: &Identity,
        folder: &Folder,
    ) -> Result<bool, HistorianError>;
}

/// Looks up alert rules and the folders that contain them.
#[async_trait]
pub trait RuleStore: Send + Sync + fmt::Debug {
    /// Returns the rule with `uid` in `org_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HistorianError::RuleNotFound`] if there is no such rule.
    async fn get_alert_rule_by_uid(
        &self,
        org_id: i64,
        uid: &str,
    ) -> Result<AlertRule, HistorianError>;

    /// Returns the folders of `org_id` containing rules the identity can see.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn get_user_visible_namespaces(
        &self,
        org_id: i64,
        identity: &Identity,
    ) -> Result<Vec<Folder>, HistorianError>;
}

/// Grants every identity access to everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl AccessControl for AllowAll {
    async fn can_read_all_rules(&self, _identity: &Identity) -> Result<bool, HistorianError> {
        Ok(true)
    }

    async fn authorize_access_in_folder(
        &self,
        _identity: &Identity,
        _rule: &AlertRule,
    ) -> Result<(), HistorianError> {
        Ok(())
    }

    async fn has_access_in_folder(
        &self,
        _identity: &Identity,
        _folder: &Folder,
    ) -> Result<bool, HistorianError> {
        Ok(true)
    }
}

/// Per-user folder grants.
///
/// Users in `admins` read everything; everyone else reads only the
/// folders granted to them.
#[derive(Debug, Default)]
pub struct FolderGrants {
    admins: HashSet<i64>,
    grants: HashMap<i64, HashSet<String>>,
}

impl FolderGrants {
    /// Creates an empty grant table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `user_id` access to every folder.
    #[must_use]
    pub fn with_admin(mut self, user_id: i64) -> Self {
        self.admins.insert(user_id);
        self
    }

    /// Gives `user_id` access to `folder_uid`.
    #[must_use]
    pub fn with_grant(mut self, user_id: i64, folder_uid: &str) -> Self {
        self.grants
            .entry(user_id)
            .or_default()
            .insert(folder_uid.to_string());
        self
    }

    fn allowed(&self, identity: &Identity, folder_uid: &str) -> bool {
        self.admins.contains(&identity.user_id)
            || self
                .grants
                .get(&identity.user_id)
                .is_some_and(|folders| folders.contains(folder_uid))
    }
}

#[async_trait]
impl AccessControl for FolderGrants {
    async fn can_read_all_rules(&self, identity: &Identity) -> Result<bool, HistorianError> {
        Ok(self.admins.contains(&identity.user_id))
    }

    async fn authorize_access_in_folder(
        &self,
        identity: &Identity,
        rule: &AlertRule,
    ) -> Result<(), HistorianError> {
        if self.allowed(identity, &rule.namespace_uid) {
            Ok(())
        } else {
            Err(HistorianError::Unauthorized(format!(
                "user {} cannot read rules in folder {}",
                identity.login, rule.namespace_uid
            )))
        }
    }

    async fn has_access_in_folder(
        &self,
        identity: &Identity,
        folder: &Folder,
    ) -> Result<bool, HistorianError> {
        Ok(self.allowed(identity, &folder.uid))
    }
}

/// Rules and folders held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<(i64, String), AlertRule>>,
    folders: RwLock<HashMap<i64, Vec<Folder>>>,
}

impl InMemoryRuleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a rule, registering its folder if unknown.
    pub async fn insert(&self, rule: AlertRule) {
        {
            let mut folders = self.folders.write().await;
            let org = folders.entry(rule.org_id).or_default();
            if !org.iter().any(|f| f.uid == rule.namespace_uid) {
                org.push(Folder {
                    uid: rule.namespace_uid.clone(),
                    title: rule.namespace_uid.clone(),
                });
            }
        }
        let mut rules = self.rules.write().await;
        rules.insert((rule.org_id, rule.uid.clone()), rule);
    }

    /// Number of stored rules.
    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    /// Returns `true` if no rule is stored.
    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn get_alert_rule_by_uid(
        &self,
        org_id: i64,
        uid: &str,
    ) -> Result<AlertRule, HistorianError> {
        let rules = self.rules.read().await;
        rules
            .get(&(org_id, uid.to_string()))
            .cloned()
            .ok_or_else(|| HistorianError::RuleNotFound(uid.to_string()))
    }

    async fn get_user_visible_namespaces(
        &self,
        org_id: i64,
        _identity: &Identity,
    ) -> Result<Vec<Folder>, HistorianError> {
        let folders = self.folders.read().await;
        Ok(folders.get(&org_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::Labels;

    pub(crate) fn identity(user_id: i64) -> Identity {
        Identity {
            user_id,
            org_id: 1,
            login: format!("user{user_id}"),
        }
    }

    pub(crate) fn rule(uid: &str, folder: &str) -> AlertRule {
        AlertRule {
            id: 1,
            org_id: 1,
            uid: uid.to_string(),
            title: format!("rule {uid}"),
            namespace_uid: folder.to_string(),
            rule_group: "group".to_string(),
            condition: "A".to_string(),
            annotations: Labels::new(),
        }
    }

    #[tokio::test]
    async fn store_registers_folders_once() {
        let store = InMemoryRuleStore::new();
        store.insert(rule("r1", "f1")).await;
        store.insert(rule("r2", "f1")).await;
        store.insert(rule("r3", "f2")).await;

        assert_eq!(store.len().await, 3);
        let Ok(folders) = store.get_user_visible_namespaces(1, &identity(1)).await else {
            panic!("folders should load");
        };
        let uids = folders.iter().map(|f| f.uid.as_str()).collect::<Vec<_>>();
        assert_eq!(uids, vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn missing_rule_is_not_found() {
        let store = InMemoryRuleStore::new();
        assert!(store.is_empty().await);
        assert!(matches!(
            store.get_alert_rule_by_uid(1, "nope").await,
            Err(HistorianError::RuleNotFound(uid)) if uid == "nope"
        ));
    }

    #[tokio::test]
    async fn grants_scope_folders() {
        let access = FolderGrants::new().with_admin(1).with_grant(2, "f1");

        assert!(matches!(access.can_read_all_rules(&identity(1)).await, Ok(true)));
        assert!(matches!(access.can_read_all_rules(&identity(2)).await, Ok(false)));

        assert!(access.authorize_access_in_folder(&identity(2), &rule("r", "f1")).await.is_ok());
        assert!(matches!(
            access.authorize_access_in_folder(&identity(2), &rule("r", "f2")).await,
            Err(HistorianError::Unauthorized(_))
        ));

        let f2 = Folder {
            uid: "f2".to_string(),
            title: "Two".to_string(),
        };
        assert!(matches!(access.has_access_in_folder(&identity(2), &f2).await, Ok(false)));
        assert!(matches!(access.has_access_in_folder(&identity(3), &f2).await, Ok(false)));
        assert!(matches!(access.has_access_in_folder(&identity(1), &f2).await, Ok(true)));
    }
}
