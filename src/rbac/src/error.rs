//! Error types for role resolution and role-tag bindings

use std::fmt;
use thiserror::Error;

/// Kind of directory entity named in an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Role,
    Policy,
    User,
    Account,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Role => "role",
            Self::Policy => "policy",
            Self::User => "user",
            Self::Account => "account",
        };
        f.write_str(name)
    }
}

/// RBAC layer errors
#[derive(Debug, Error)]
pub enum RbacError {
    /// One or more names could not be matched; every unresolved name is listed
    #[error("Unresolved {kind} reference(s): {}", .names.join(", "))]
    UnresolvedReference { kind: EntityKind, names: Vec<String> },

    /// A specific entity lookup found nothing
    #[error("{kind} not found: {reference}")]
    NotFound { kind: EntityKind, reference: String },

    /// Directory or collaborator service transport failure
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Instance-inventory tag write failed; carries no cause
    #[error("Invalid role tag")]
    InvalidRoleTag,

    /// Malformed path or reference
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// PostgreSQL directory failure
    #[error("Database error: {0}")]
    Database(String),
}

impl RbacError {
    pub fn unresolved(kind: EntityKind, names: Vec<String>) -> Self {
        Self::UnresolvedReference { kind, names }
    }

    pub fn not_found(kind: EntityKind, reference: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            reference: reference.to_string(),
        }
    }

    /// Whether the transport layer should surface this as a caller error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedReference { .. } | Self::InvalidRoleTag | Self::InvalidInput(_)
        )
    }

    /// Transport-level error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnresolvedReference { .. } | Self::InvalidRoleTag | Self::InvalidInput(_) => {
                "InvalidArgument"
            }
            Self::NotFound { .. } => "ResourceNotFound",
            Self::BackendUnavailable(_) => "ServiceUnavailable",
            Self::Database(_) => "InternalError",
        }
    }
}

/// Result type for RBAC operations
pub type Result<T> = std::result::Result<T, RbacError>;
