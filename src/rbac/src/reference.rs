//! Typed addressing for directory entities
//!
//! The same logical entity can be referred to three ways: by display name,
//! by UUID, or by its hierarchical directory path. [`Reference`] carries
//! exactly one of those forms and each resolver normalizes it into the
//! filter term its backend search needs.

use crate::error::{RbacError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Fixed tail shared by every path in the directory tree
pub const DIRECTORY_SUFFIX: [(&str, &str); 2] = [("ou", "users"), ("o", "cretoai")];

const ROLE_ATTR: &str = "role-uuid";
const POLICY_ATTR: &str = "policy-uuid";
const RESOURCE_ATTR: &str = "resource-uuid";
const UUID_ATTR: &str = "uuid";

/// Hierarchical directory path, leaf component first
///
/// ```
/// use cretoai_rbac::reference::DirPath;
/// use uuid::Uuid;
///
/// let account = Uuid::new_v4();
/// let user = Uuid::new_v4();
/// let path = DirPath::sub_user(account, user);
/// assert_eq!(path.leaf_uuid(), Some(user));
/// assert_eq!(path.owner_account(), Some(account));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirPath {
    components: Vec<(String, String)>,
}

impl DirPath {
    /// Parse a path such as `uuid=..., uuid=..., ou=users, o=cretoai`
    ///
    /// Attribute names are lowercased, UUID values are rewritten in their
    /// canonical hyphenated form and whitespace around separators is dropped,
    /// so that equal paths always render identically.
    pub fn parse(s: &str) -> Result<Self> {
        let mut components = Vec::new();
        for part in s.split(',') {
            let (attr, value) = part
                .split_once('=')
                .ok_or_else(|| RbacError::InvalidInput(format!("Malformed path component '{}'", part.trim())))?;
            let attr = attr.trim().to_ascii_lowercase();
            let value = value.trim();
            if attr.is_empty() || value.is_empty() {
                return Err(RbacError::InvalidInput(format!("Empty path component in '{}'", s)));
            }
            let value = match Uuid::parse_str(value) {
                Ok(uuid) => uuid.to_string(),
                Err(_) => value.to_string(),
            };
            components.push((attr, value));
        }

        let path = Self { components };
        if path.body().is_none() {
            return Err(RbacError::InvalidInput(format!("Path '{}' is outside the directory tree", s)));
        }
        Ok(path)
    }

    fn from_body(body: Vec<(String, String)>) -> Self {
        let mut components = body;
        components.extend(
            DIRECTORY_SUFFIX
                .iter()
                .map(|(attr, value)| (attr.to_string(), value.to_string())),
        );
        Self { components }
    }

    fn under_account(attr: &str, leaf: Uuid, account: Uuid) -> Self {
        Self::from_body(vec![
            (attr.to_string(), leaf.to_string()),
            (UUID_ATTR.to_string(), account.to_string()),
        ])
    }

    /// Path of a top-level account
    pub fn account(account: Uuid) -> Self {
        Self::from_body(vec![(UUID_ATTR.to_string(), account.to_string())])
    }

    /// Path of a sub-user beneath an account
    pub fn sub_user(account: Uuid, user: Uuid) -> Self {
        Self::under_account(UUID_ATTR, user, account)
    }

    pub fn role(account: Uuid, role: Uuid) -> Self {
        Self::under_account(ROLE_ATTR, role, account)
    }

    pub fn policy(account: Uuid, policy: Uuid) -> Self {
        Self::under_account(POLICY_ATTR, policy, account)
    }

    /// Path of a generic resource's binding record
    pub fn binding(account: Uuid, id: Uuid) -> Self {
        Self::under_account(RESOURCE_ATTR, id, account)
    }

    /// Components above the directory suffix, or `None` when the suffix is missing
    fn body(&self) -> Option<&[(String, String)]> {
        let n = self.components.len();
        if n <= DIRECTORY_SUFFIX.len() {
            return None;
        }
        let split = n - DIRECTORY_SUFFIX.len();
        let tail_matches = self.components[split..]
            .iter()
            .zip(DIRECTORY_SUFFIX.iter())
            .all(|((attr, value), (want_attr, want_value))| attr == want_attr && value == want_value);
        tail_matches.then(|| &self.components[..split])
    }

    pub fn components(&self) -> &[(String, String)] {
        &self.components
    }

    /// The leaf attribute and value
    pub fn leaf(&self) -> (&str, &str) {
        let (attr, value) = &self.components[0];
        (attr.as_str(), value.as_str())
    }

    pub fn leaf_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(self.leaf().1).ok()
    }

    /// UUID of the account owning this entry (the account itself for account paths)
    pub fn owner_account(&self) -> Option<Uuid> {
        let body = self.body()?;
        let (attr, value) = body.last()?;
        if attr != UUID_ATTR {
            return None;
        }
        Uuid::parse_str(value).ok()
    }

    pub fn is_role(&self) -> bool {
        self.leaf().0 == ROLE_ATTR
    }

    pub fn is_policy(&self) -> bool {
        self.leaf().0 == POLICY_ATTR
    }
}

impl fmt::Display for DirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (attr, value)) in self.components.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", attr, value)?;
        }
        Ok(())
    }
}

impl FromStr for DirPath {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for DirPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DirPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A reference to a role, policy or user in one of its three addressing forms
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// Display name (role/policy name, user login)
    Name(String),
    /// Opaque identifier
    Id(Uuid),
    /// Hierarchical directory path
    Path(DirPath),
}

impl Reference {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Classify an untyped string: paths contain `=`, identifiers parse as UUIDs
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RbacError::InvalidInput("Empty reference".to_string()));
        }
        if s.contains('=') {
            return DirPath::parse(s).map(Self::Path);
        }
        Ok(match Uuid::parse_str(s) {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(s.to_string()),
        })
    }

    /// Name references for each of `names`
    pub fn names<I, S>(names: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(|n| Self::Name(n.into())).collect()
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Id(id) => write!(f, "{}", id),
            Self::Path(path) => write!(f, "{}", path),
        }
    }
}

/// A stored role member reference
///
/// The three forms are mutually exclusive: a string containing `=` is
/// always a path and must be either a sub-user or an account path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRef {
    SubUser { account: Uuid, user: Uuid },
    Account(Uuid),
    Plain(String),
}

impl MemberRef {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.contains('=') {
            if s.is_empty() {
                return Err(RbacError::InvalidInput("Empty member reference".to_string()));
            }
            return Ok(Self::Plain(s.to_string()));
        }

        let path = DirPath::parse(s)?;
        let body = path.body().unwrap_or_default();
        let uuid_at = |idx: usize| -> Option<Uuid> {
            let (attr, value) = body.get(idx)?;
            (attr == UUID_ATTR).then(|| Uuid::parse_str(value).ok()).flatten()
        };

        let member = match body.len() {
            1 => uuid_at(0).map(Self::Account),
            2 => uuid_at(0)
                .zip(uuid_at(1))
                .map(|(user, account)| Self::SubUser { account, user }),
            _ => None,
        };
        member.ok_or_else(|| RbacError::InvalidInput(format!("'{}' is neither a sub-user nor an account path", s)))
    }

    pub fn to_path(&self) -> Option<DirPath> {
        match self {
            Self::SubUser { account, user } => Some(DirPath::sub_user(*account, *user)),
            Self::Account(account) => Some(DirPath::account(*account)),
            Self::Plain(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_roundtrip_normalizes() {
        let account = Uuid::new_v4();
        let role = Uuid::new_v4();
        let messy = format!("ROLE-UUID={} ,uuid= {},  OU=users,o=cretoai", role, account);

        let path = DirPath::parse(&messy).unwrap();
        assert_eq!(path, DirPath::role(account, role));
        assert_eq!(
            path.to_string(),
            format!("role-uuid={}, uuid={}, ou=users, o=cretoai", role, account)
        );
        assert!(path.is_role());
        assert_eq!(path.leaf_uuid(), Some(role));
        assert_eq!(path.owner_account(), Some(account));
    }

    #[test]
    fn test_uuid_values_canonicalized() {
        let account = Uuid::new_v4();
        let role = Uuid::new_v4();
        let shouting = format!(
            "role-uuid={}, uuid={}, ou=users, o=cretoai",
            role.to_string().to_uppercase(),
            account.simple()
        );

        let path = DirPath::parse(&shouting).unwrap();
        assert_eq!(path, DirPath::role(account, role));
        assert_eq!(path.leaf().1, role.to_string());
    }

    #[test]
    fn test_path_outside_tree_rejected() {
        assert!(DirPath::parse("uuid=abc, ou=groups, o=other").is_err());
        assert!(DirPath::parse("ou=users, o=cretoai").is_err());
        assert!(DirPath::parse("uuid=, ou=users, o=cretoai").is_err());
        assert!(DirPath::parse("garbage").is_err());
    }

    #[test]
    fn test_account_path_owner_is_itself() {
        let account = Uuid::new_v4();
        assert_eq!(DirPath::account(account).owner_account(), Some(account));
    }

    #[test]
    fn test_reference_classification() {
        let id = Uuid::new_v4();
        assert_eq!(Reference::parse("admin").unwrap(), Reference::name("admin"));
        assert_eq!(Reference::parse(&id.to_string()).unwrap(), Reference::Id(id));

        let path = DirPath::role(Uuid::new_v4(), id);
        assert_eq!(Reference::parse(&path.to_string()).unwrap(), Reference::Path(path));
        assert!(Reference::parse("  ").is_err());
    }

    #[test]
    fn test_member_forms_are_exclusive() {
        let account = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert_eq!(
            MemberRef::parse(&DirPath::sub_user(account, user).to_string()).unwrap(),
            MemberRef::SubUser { account, user }
        );
        assert_eq!(
            MemberRef::parse(&DirPath::account(account).to_string()).unwrap(),
            MemberRef::Account(account)
        );
        assert_eq!(MemberRef::parse("bob").unwrap(), MemberRef::Plain("bob".to_string()));

        // A role path is a path, but not a member path
        let role_path = DirPath::role(account, user).to_string();
        assert!(MemberRef::parse(&role_path).is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let path = DirPath::policy(Uuid::new_v4(), Uuid::new_v4());
        let json = serde_json::to_string(&path).unwrap();
        let back: DirPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
