//! Request-scoped membership cache
//!
//! One [`MembershipCache`] is built per inbound request and dropped with it.
//! Resolvers consult it before every user or cross-account lookup and write
//! results back under every key the entity can be addressed by, so a second
//! resolution of the same member yields the same `Arc` without a backend call.

use crate::types::{Account, User};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Statistics about cache effectiveness
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Distinct cached users plus cached account lookups
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum UserKey {
    Uuid(Uuid),
    Login(Uuid, String),
}

/// Per-request memo table for users and cross-account identities
#[derive(Default)]
pub struct MembershipCache {
    users: DashMap<UserKey, Arc<User>>,
    /// `None` records an account that does not exist
    accounts: DashMap<Uuid, Option<Arc<Account>>>,
    stats: DashMap<&'static str, usize>,
}

impl MembershipCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_by_uuid(&self, uuid: Uuid) -> Option<Arc<User>> {
        self.lookup(&UserKey::Uuid(uuid))
    }

    /// Logins are only unique within an account, so the account is part of the key
    pub fn user_by_login(&self, account: Uuid, login: &str) -> Option<Arc<User>> {
        self.lookup(&UserKey::Login(account, login.to_string()))
    }

    fn lookup(&self, key: &UserKey) -> Option<Arc<User>> {
        match self.users.get(key) {
            Some(user) => {
                self.increment_stat("hits");
                Some(Arc::clone(&user))
            }
            None => {
                self.increment_stat("misses");
                None
            }
        }
    }

    /// Store a user under both its UUID and login
    ///
    /// If the user is already cached the existing `Arc` is returned, so
    /// every holder within the request shares one object.
    pub fn insert_user(&self, user: User) -> Arc<User> {
        let shared = self
            .users
            .entry(UserKey::Uuid(user.uuid))
            .or_insert_with(|| Arc::new(user))
            .clone();
        self.users
            .entry(UserKey::Login(shared.account, shared.login.clone()))
            .or_insert_with(|| Arc::clone(&shared));
        shared
    }

    /// Cached cross-account lookup; the outer `None` means not yet looked up
    pub fn account(&self, uuid: Uuid) -> Option<Option<Arc<Account>>> {
        match self.accounts.get(&uuid) {
            Some(entry) => {
                self.increment_stat("hits");
                Some(entry.clone())
            }
            None => {
                self.increment_stat("misses");
                None
            }
        }
    }

    pub fn insert_account(&self, uuid: Uuid, account: Option<Account>) -> Option<Arc<Account>> {
        self.accounts
            .entry(uuid)
            .or_insert_with(|| account.map(Arc::new))
            .clone()
    }

    pub fn stats(&self) -> CacheStats {
        let users = self
            .users
            .iter()
            .filter(|entry| matches!(entry.key(), UserKey::Uuid(_)))
            .count();
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            entries: users + self.accounts.len(),
        }
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats.entry(key).and_modify(|count| *count += 1).or_insert(1);
    }

    fn get_stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(account: Uuid, login: &str) -> User {
        User {
            uuid: Uuid::new_v4(),
            account,
            login: login.to_string(),
        }
    }

    #[test]
    fn test_either_key_hits() {
        let cache = MembershipCache::new();
        let account = Uuid::new_v4();
        let bob = cache.insert_user(user(account, "bob"));

        let by_uuid = cache.user_by_uuid(bob.uuid).unwrap();
        let by_login = cache.user_by_login(account, "bob").unwrap();
        assert!(Arc::ptr_eq(&by_uuid, &bob));
        assert!(Arc::ptr_eq(&by_login, &bob));
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_login_scoped_to_account() {
        let cache = MembershipCache::new();
        let account = Uuid::new_v4();
        cache.insert_user(user(account, "bob"));

        assert!(cache.user_by_login(Uuid::new_v4(), "bob").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_reinsert_returns_existing_object() {
        let cache = MembershipCache::new();
        let bob = user(Uuid::new_v4(), "bob");
        let first = cache.insert_user(bob.clone());
        let second = cache.insert_user(bob);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_account_misses_are_remembered() {
        let cache = MembershipCache::new();
        let ghost = Uuid::new_v4();
        assert!(cache.account(ghost).is_none());

        cache.insert_account(ghost, None);
        assert_eq!(cache.account(ghost), Some(None));

        let partner = Account::new(Uuid::new_v4(), "partner");
        let stored = cache.insert_account(partner.uuid, Some(partner.clone()));
        assert_eq!(stored.as_deref(), Some(&partner));
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
