//! In-memory collaborator implementations
//!
//! Every operation is counted so callers can observe batching and caching,
//! and each store can be switched into a failing mode.

use super::{
    AccountDirectory, BindingRecord, Directory, InstanceInventory, PolicyEntry, RoleEntry,
    UserEntry,
};
use crate::error::{RbacError, Result};
use crate::filter::Filter;
use crate::types::Account;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Snapshot of directory call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryCalls {
    pub role_searches: usize,
    pub policy_searches: usize,
    pub user_searches: usize,
    pub binding_reads: usize,
    pub binding_writes: usize,
    pub binding_deletes: usize,
}

#[derive(Default)]
struct DirectoryCounters {
    role_searches: AtomicUsize,
    policy_searches: AtomicUsize,
    user_searches: AtomicUsize,
    binding_reads: AtomicUsize,
    binding_writes: AtomicUsize,
    binding_deletes: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// In-memory directory
#[derive(Default)]
pub struct InMemoryDirectory {
    roles: Arc<RwLock<Vec<RoleEntry>>>,
    policies: Arc<RwLock<Vec<PolicyEntry>>>,
    users: Arc<RwLock<Vec<UserEntry>>>,
    bindings: Arc<RwLock<HashMap<Uuid, BindingRecord>>>,
    counters: DirectoryCounters,
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_role(&self, role: RoleEntry) {
        self.roles.write().await.push(role);
    }

    pub async fn add_policy(&self, policy: PolicyEntry) {
        self.policies.write().await.push(policy);
    }

    pub async fn add_user(&self, user: UserEntry) {
        self.users.write().await.push(user);
    }

    /// All stored binding records
    pub async fn bindings(&self) -> Vec<BindingRecord> {
        self.bindings.read().await.values().cloned().collect()
    }

    pub fn calls(&self) -> DirectoryCalls {
        let c = &self.counters;
        DirectoryCalls {
            role_searches: c.role_searches.load(Ordering::SeqCst),
            policy_searches: c.policy_searches.load(Ordering::SeqCst),
            user_searches: c.user_searches.load(Ordering::SeqCst),
            binding_reads: c.binding_reads.load(Ordering::SeqCst),
            binding_writes: c.binding_writes.load(Ordering::SeqCst),
            binding_deletes: c.binding_deletes.load(Ordering::SeqCst),
        }
    }

    /// Make every operation fail as if the directory were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make binding upserts fail while everything else keeps working
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make binding deletions fail while everything else keeps working
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RbacError::BackendUnavailable("directory unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn search_roles(&self, account: Uuid, filter: &Filter) -> Result<Vec<RoleEntry>> {
        bump(&self.counters.role_searches);
        self.check_available()?;
        let roles = self.roles.read().await;
        Ok(roles
            .iter()
            .filter(|r| r.account == account && filter.matches(*r))
            .cloned()
            .collect())
    }

    async fn search_policies(&self, account: Uuid, filter: &Filter) -> Result<Vec<PolicyEntry>> {
        bump(&self.counters.policy_searches);
        self.check_available()?;
        let policies = self.policies.read().await;
        Ok(policies
            .iter()
            .filter(|p| p.account == account && filter.matches(*p))
            .cloned()
            .collect())
    }

    async fn search_users(&self, account: Uuid, filter: &Filter) -> Result<Vec<UserEntry>> {
        bump(&self.counters.user_searches);
        self.check_available()?;
        let users = self.users.read().await;
        Ok(users
            .iter()
            .filter(|u| u.account == account && filter.matches(*u))
            .cloned()
            .collect())
    }

    async fn get_binding(&self, account: Uuid, name: &str) -> Result<Option<BindingRecord>> {
        bump(&self.counters.binding_reads);
        self.check_available()?;
        let bindings = self.bindings.read().await;
        Ok(bindings
            .values()
            .find(|b| b.account == account && b.name == name)
            .cloned())
    }

    async fn put_binding(&self, record: &BindingRecord) -> Result<()> {
        bump(&self.counters.binding_writes);
        self.check_available()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RbacError::BackendUnavailable("binding write failed".to_string()));
        }
        let mut bindings = self.bindings.write().await;
        bindings.insert(record.id, record.clone());
        Ok(())
    }

    async fn delete_binding(&self, account: Uuid, id: Uuid) -> Result<()> {
        bump(&self.counters.binding_deletes);
        self.check_available()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RbacError::BackendUnavailable("binding delete failed".to_string()));
        }
        let mut bindings = self.bindings.write().await;
        if bindings.get(&id).is_some_and(|b| b.account == account) {
            bindings.remove(&id);
        }
        Ok(())
    }
}

/// In-memory instance inventory
#[derive(Default)]
pub struct InMemoryInventory {
    tags: Arc<RwLock<HashMap<Uuid, (Uuid, Vec<Uuid>)>>>,
    sets: AtomicUsize,
    clears: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role UUIDs currently tagged on an instance
    pub async fn tags_of(&self, instance: Uuid) -> Option<Vec<Uuid>> {
        self.tags.read().await.get(&instance).map(|(_, roles)| roles.clone())
    }

    pub fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RbacError::BackendUnavailable(
                "inventory rejected tag update: instance state conflict".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceInventory for InMemoryInventory {
    async fn set_role_tags(&self, instance: Uuid, owner: Uuid, roles: &[Uuid]) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.tags.write().await.insert(instance, (owner, roles.to_vec()));
        Ok(())
    }

    async fn clear_role_tags(&self, instance: Uuid, owner: Uuid) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.tags.write().await.insert(instance, (owner, Vec::new()));
        Ok(())
    }
}

/// In-memory cross-account lookup
#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: Arc<RwLock<HashMap<Uuid, Account>>>,
    failing: Arc<RwLock<HashSet<Uuid>>>,
    lookups: AtomicUsize,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, account: Account) {
        self.accounts.write().await.insert(account.uuid, account);
    }

    /// Make lookups of one account fail with a transport error
    pub async fn fail_lookups_for(&self, uuid: Uuid) {
        self.failing.write().await.insert(uuid);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccounts {
    async fn get_account(&self, uuid: Uuid) -> Result<Option<Account>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().await.contains(&uuid) {
            return Err(RbacError::BackendUnavailable(format!("account lookup for {} timed out", uuid)));
        }
        Ok(self.accounts.read().await.get(&uuid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_is_account_scoped() {
        let dir = InMemoryDirectory::new();
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        for account in [mine, theirs] {
            dir.add_role(RoleEntry {
                uuid: Uuid::new_v4(),
                account,
                name: "admin".to_string(),
                members: vec![],
                default_members: vec![],
                policies: vec![],
            })
            .await;
        }

        let found = dir.search_roles(mine, &Filter::eq("name", "admin")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].account, mine);
        assert_eq!(dir.calls().role_searches, 1);
    }

    #[tokio::test]
    async fn test_unavailable_directory() {
        let dir = InMemoryDirectory::new();
        dir.set_unavailable(true);
        let err = dir.get_binding(Uuid::new_v4(), "/acct/users").await.unwrap_err();
        assert!(matches!(err, RbacError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_inventory_clear_keeps_instance() {
        let inventory = InMemoryInventory::new();
        let instance = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let role = Uuid::new_v4();

        inventory.set_role_tags(instance, owner, &[role]).await.unwrap();
        assert_eq!(inventory.tags_of(instance).await, Some(vec![role]));

        inventory.clear_role_tags(instance, owner).await.unwrap();
        assert_eq!(inventory.tags_of(instance).await, Some(vec![]));
        assert_eq!(inventory.set_calls(), 1);
        assert_eq!(inventory.clear_calls(), 1);
    }

    #[tokio::test]
    async fn test_account_lookup_failure_injection() {
        let accounts = InMemoryAccounts::new();
        let ok = Account::new(Uuid::new_v4(), "partner");
        let bad = Uuid::new_v4();
        accounts.add(ok.clone()).await;
        accounts.fail_lookups_for(bad).await;

        assert_eq!(accounts.get_account(ok.uuid).await.unwrap(), Some(ok));
        assert!(accounts.get_account(bad).await.is_err());
        assert_eq!(accounts.get_account(Uuid::new_v4()).await.unwrap(), None);
        assert_eq!(accounts.lookups(), 3);
    }
}
