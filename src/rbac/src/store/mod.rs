//! Backing-store collaborators
//!
//! Three independent services sit behind the resolution layer:
//!
//! - [`Directory`]: roles, policies, sub-users and generic binding records
//! - [`InstanceInventory`]: role tags stored on physical compute instances
//! - [`AccountDirectory`]: public identity of other accounts
//!
//! Writes to the directory and to the instance inventory are never
//! coordinated; callers must tolerate one succeeding while the other fails.

use crate::error::Result;
use crate::filter::{Attributes, Filter};
use crate::reference::DirPath;
use crate::types::{Account, RuleDocument};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{InMemoryAccounts, InMemoryDirectory, InMemoryInventory};
#[cfg(feature = "postgres")]
pub use postgres::PostgresDirectory;

/// Role entry as stored; members and policies are hierarchical paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub uuid: Uuid,
    pub account: Uuid,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub default_members: Vec<String>,
    #[serde(default)]
    pub policies: Vec<String>,
}

impl Attributes for RoleEntry {
    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "name" => Some(self.name.clone()),
            "uuid" => Some(self.uuid.to_string()),
            _ => None,
        }
    }
}

/// Stored form of a policy's rule document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredRules {
    List(Vec<String>),
    Serialized(String),
}

impl StoredRules {
    pub fn into_document(self) -> RuleDocument {
        match self {
            Self::List(rules) => RuleDocument::Rules(rules),
            Self::Serialized(raw) => RuleDocument::from_serialized(&raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub uuid: Uuid,
    pub account: Uuid,
    pub name: String,
    pub rules: StoredRules,
    #[serde(default)]
    pub description: Option<String>,
}

impl Attributes for PolicyEntry {
    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "name" => Some(self.name.clone()),
            "uuid" => Some(self.uuid.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub uuid: Uuid,
    pub account: Uuid,
    pub login: String,
}

impl Attributes for UserEntry {
    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "login" => Some(self.login.clone()),
            "uuid" => Some(self.uuid.to_string()),
            _ => None,
        }
    }
}

/// Role-tag binding of a generic (directory-backed) resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    /// Internal identifier, assigned on first tagging
    pub id: Uuid,
    pub account: Uuid,
    /// Canonical resource name
    pub name: String,
    /// Tagged roles as hierarchical paths
    pub roles: Vec<DirPath>,
    pub updated_at: DateTime<Utc>,
}

impl BindingRecord {
    pub fn new(account: Uuid, name: impl Into<String>, roles: Vec<DirPath>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account,
            name: name.into(),
            roles,
            updated_at: Utc::now(),
        }
    }

    pub fn path(&self) -> DirPath {
        DirPath::binding(self.account, self.id)
    }
}

/// Directory service: subtree searches plus binding-record storage
#[async_trait]
pub trait Directory: Send + Sync {
    /// Filtered search over the roles beneath an account
    async fn search_roles(&self, account: Uuid, filter: &Filter) -> Result<Vec<RoleEntry>>;

    /// Filtered search over the policies beneath an account
    async fn search_policies(&self, account: Uuid, filter: &Filter) -> Result<Vec<PolicyEntry>>;

    /// Filtered search over the sub-users beneath an account
    async fn search_users(&self, account: Uuid, filter: &Filter) -> Result<Vec<UserEntry>>;

    /// Point lookup of a binding record by canonical resource name
    async fn get_binding(&self, account: Uuid, name: &str) -> Result<Option<BindingRecord>>;

    /// Insert or replace a binding record, keyed by its identifier
    async fn put_binding(&self, record: &BindingRecord) -> Result<()>;

    async fn delete_binding(&self, account: Uuid, id: Uuid) -> Result<()>;
}

/// Instance-inventory service holding role tags on physical instances
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    async fn set_role_tags(&self, instance: Uuid, owner: Uuid, roles: &[Uuid]) -> Result<()>;

    async fn clear_role_tags(&self, instance: Uuid, owner: Uuid) -> Result<()>;
}

/// Cross-account identity lookup
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// `Ok(None)` when no such account exists
    async fn get_account(&self, uuid: Uuid) -> Result<Option<Account>>;
}
