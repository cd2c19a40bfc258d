//! Versioned output shapes
//!
//! Resolution is version-agnostic; the shape a client sees is chosen here,
//! at the boundary, from the requested API version.

use crate::config::{ApiVersion, RbacConfig};
use crate::types::{MemberKind, Policy, Role, RuleDocument};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Older shape: members flattened to sub-user logins, account members dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyRole {
    pub name: String,
    pub id: Uuid,
    pub members: Vec<String>,
    pub default_members: Vec<String>,
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Uuid,
    pub login: String,
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRef {
    pub id: Uuid,
    pub name: String,
}

/// Newer shape: typed members distinguishing sub-users from accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredRole {
    pub name: String,
    pub id: Uuid,
    pub members: Vec<MemberView>,
    pub policies: Vec<PolicyRef>,
}

pub fn legacy_role(role: &Role) -> LegacyRole {
    let sub_users = role.members.iter().filter(|m| m.is_sub_user());
    LegacyRole {
        name: role.name.clone(),
        id: role.uuid,
        members: sub_users.clone().map(|m| m.login().to_string()).collect(),
        default_members: sub_users
            .filter(|m| m.default)
            .map(|m| m.login().to_string())
            .collect(),
        policies: role.policies.iter().map(|p| p.name.clone()).collect(),
    }
}

pub fn structured_role(role: &Role) -> StructuredRole {
    StructuredRole {
        name: role.name.clone(),
        id: role.uuid,
        members: role
            .members
            .iter()
            .map(|m| MemberView {
                kind: match m.kind {
                    MemberKind::SubUser(_) => "subuser",
                    MemberKind::Account(_) => "account",
                },
                id: m.uuid(),
                login: m.login().to_string(),
                default: m.default,
            })
            .collect(),
        policies: role
            .policies
            .iter()
            .map(|p| PolicyRef {
                id: p.uuid,
                name: p.name.clone(),
            })
            .collect(),
    }
}

/// Render a role in the shape `version` expects
pub fn render_role(role: &Role, version: ApiVersion, config: &RbacConfig) -> Value {
    if config.structured_members(version) {
        json!(structured_role(role))
    } else {
        json!(legacy_role(role))
    }
}

pub fn render_policy(policy: &Policy) -> Value {
    let rules = match &policy.rules {
        RuleDocument::Rules(rules) => json!(rules),
        RuleDocument::Raw(raw) => json!(raw),
    };
    let mut view = json!({
        "name": policy.name,
        "id": policy.uuid,
        "rules": rules,
    });
    if let Some(description) = &policy.description {
        view["description"] = json!(description);
    }
    view
}
