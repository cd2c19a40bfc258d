//! Per-request state carried through resolution and binding

use crate::cache::MembershipCache;
use crate::canonical::ResourceName;
use crate::config::ApiVersion;
use crate::types::{Account, Role, User};
use uuid::Uuid;

/// The authenticated caller, as established by the transport layer
#[derive(Debug, Clone)]
pub struct Caller {
    /// Account in scope for the request
    pub account: Account,
    /// Set when the caller is a sub-user rather than the account owner
    pub user: Option<User>,
    /// Roles the caller currently has active
    pub active_roles: Vec<Role>,
}

impl Caller {
    pub fn owner(account: Account) -> Self {
        Self {
            account,
            user: None,
            active_roles: Vec::new(),
        }
    }

    pub fn sub_user(account: Account, user: User, active_roles: Vec<Role>) -> Self {
        Self {
            account,
            user: Some(user),
            active_roles,
        }
    }

    pub fn is_sub_user(&self) -> bool {
        self.user.is_some()
    }
}

/// A physical compute instance already loaded by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub uuid: Uuid,
    pub owner: Uuid,
    /// Stored as role UUIDs; rewritten to role names once loaded
    pub role_tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ResourceKind {
    /// Role tags live on the instance itself
    Instance(Instance),
    /// Role tags live in a directory binding record
    Virtual,
}

/// A resource together with its currently bound roles
#[derive(Debug, Clone)]
pub struct LoadedResource {
    pub name: ResourceName,
    pub account: Uuid,
    /// Binding-record identifier; `None` until first tagged
    pub id: Option<Uuid>,
    pub kind: ResourceKind,
    pub roles: Vec<Role>,
}

impl LoadedResource {
    pub fn is_instance(&self) -> bool {
        matches!(self.kind, ResourceKind::Instance(_))
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

/// Request-scoped context; the cache inside is discarded with it
pub struct RequestContext {
    pub caller: Caller,
    pub version: ApiVersion,
    /// Desired tag set supplied on this request, if any
    pub role_tags: Option<Vec<String>>,
    pub cache: MembershipCache,
    pub resource: Option<LoadedResource>,
}

impl RequestContext {
    pub fn new(caller: Caller, version: ApiVersion) -> Self {
        Self {
            caller,
            version,
            role_tags: None,
            cache: MembershipCache::new(),
            resource: None,
        }
    }

    /// Explicit role names from the request body
    pub fn with_role_tags<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_tags = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Role names from the role-tag header, unless the body already supplied some
    pub fn with_role_tag_header(mut self, value: &str) -> Self {
        if self.role_tags.is_none() {
            self.role_tags = Some(parse_role_tag_header(value));
        }
        self
    }

    pub fn account(&self) -> &Account {
        &self.caller.account
    }
}

/// Split a comma-separated role-tag header, dropping blanks and repeats
pub fn parse_role_tag_header(value: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub fn format_role_tag_header(names: &[String]) -> String {
    names.join(",")
}
