//! Materialized directory entities

use crate::reference::DirPath;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Top-level tenant owning roles, policies, users and tagged resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub uuid: Uuid,
    pub login: String,
}

impl Account {
    pub fn new(uuid: Uuid, login: impl Into<String>) -> Self {
        Self {
            uuid,
            login: login.into(),
        }
    }

    pub fn path(&self) -> DirPath {
        DirPath::account(self.uuid)
    }
}

/// Sub-user scoped beneath one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uuid: Uuid,
    pub account: Uuid,
    /// Unique within the owning account
    pub login: String,
}

impl User {
    pub fn path(&self) -> DirPath {
        DirPath::sub_user(self.account, self.uuid)
    }
}

/// Policy rule document. Content is opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleDocument {
    /// Ordered rule strings
    Rules(Vec<String>),
    /// A serialized document that could not be decoded
    Raw(String),
}

impl RuleDocument {
    /// Decode a serialized rule list, keeping the raw string if it is not one
    pub fn from_serialized(raw: &str) -> Self {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(rules) => Self::Rules(rules),
            Err(_) => Self::Raw(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub uuid: Uuid,
    pub account: Uuid,
    pub name: String,
    pub rules: RuleDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Policy {
    pub fn path(&self) -> DirPath {
        DirPath::policy(self.account, self.uuid)
    }
}

/// Who a role member is
#[derive(Debug, Clone)]
pub enum MemberKind {
    SubUser(Arc<User>),
    /// Cross-account delegation to a whole account
    Account(Arc<Account>),
}

#[derive(Debug, Clone)]
pub struct Member {
    pub kind: MemberKind,
    /// Active without explicit role activation
    pub default: bool,
}

impl Member {
    pub fn uuid(&self) -> Uuid {
        match &self.kind {
            MemberKind::SubUser(user) => user.uuid,
            MemberKind::Account(account) => account.uuid,
        }
    }

    pub fn login(&self) -> &str {
        match &self.kind {
            MemberKind::SubUser(user) => &user.login,
            MemberKind::Account(account) => &account.login,
        }
    }

    pub fn is_sub_user(&self) -> bool {
        matches!(self.kind, MemberKind::SubUser(_))
    }
}

/// Named bundle of policies plus a membership list
#[derive(Debug, Clone)]
pub struct Role {
    pub uuid: Uuid,
    pub account: Uuid,
    /// Unique within the owning account
    pub name: String,
    pub policies: Vec<Policy>,
    pub members: Vec<Member>,
}

impl Role {
    pub fn path(&self) -> DirPath {
        DirPath::role(self.account, self.uuid)
    }

    pub fn default_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_document_decodes_lists() {
        let doc = RuleDocument::from_serialized(r#"["CAN listmachines", "CAN getmachine"]"#);
        assert_eq!(
            doc,
            RuleDocument::Rules(vec!["CAN listmachines".to_string(), "CAN getmachine".to_string()])
        );
    }

    #[test]
    fn test_rule_document_keeps_raw_on_failure() {
        let doc = RuleDocument::from_serialized("CAN listmachines");
        assert_eq!(doc, RuleDocument::Raw("CAN listmachines".to_string()));
    }

    #[test]
    fn test_member_accessors() {
        let account = Uuid::new_v4();
        let user = Arc::new(User {
            uuid: Uuid::new_v4(),
            account,
            login: "bob".to_string(),
        });
        let member = Member {
            kind: MemberKind::SubUser(user.clone()),
            default: true,
        };
        assert!(member.is_sub_user());
        assert_eq!(member.login(), "bob");
        assert_eq!(member.uuid(), user.uuid);
    }
}
