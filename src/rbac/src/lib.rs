//! # CretoAI RBAC
//!
//! Role resolution and resource role-tag bindings for the CretoAI directory.
//!
//! ## Features
//!
//! - **Resource naming**: request paths canonicalized to stable resource names
//! - **Role resolution** by name or UUID, with policies and members hydrated
//! - **Request-scoped membership cache** so each identity is fetched once
//! - **Best-effort cross-account members** fetched concurrently
//! - **Role-tag bindings** stored on instances or in directory binding records
//! - **Versioned output** for legacy and structured member shapes
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rbac::store::{InMemoryAccounts, InMemoryDirectory, InMemoryInventory};
//! use cretoai_rbac::{canonicalize_path, ApiVersion, Caller, RbacConfig, RequestContext, ResourceRoleBinding};
//! use cretoai_rbac::types::Account;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let binding = ResourceRoleBinding::new(
//!         Arc::new(InMemoryDirectory::new()),
//!         Arc::new(InMemoryInventory::new()),
//!         Arc::new(InMemoryAccounts::new()),
//!         RbacConfig::default(),
//!     );
//!
//!     let account = Account::new(Uuid::new_v4(), "acme");
//!     let mut ctx = RequestContext::new(Caller::owner(account), ApiVersion::new(9, 0));
//!     let name = canonicalize_path("acme", "/acme/images/base-64");
//!
//!     binding.load_resource(&mut ctx, name, None).await?;
//!     assert!(ResourceRoleBinding::get_role_tags(&ctx).is_empty());
//!
//!     Ok(())
//! }
//! ```

pub mod binding;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod reference;
pub mod resolver;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod views;

// Re-export commonly used types
pub use binding::{ResourceRoleBinding, SavedTags};
pub use cache::{CacheStats, MembershipCache};
pub use canonical::{canonicalize, canonicalize_path, ResourceName};
pub use config::{ApiVersion, RbacConfig};
pub use context::{Caller, Instance, LoadedResource, RequestContext, ResourceKind};
pub use error::{EntityKind, RbacError, Result};
pub use reference::{DirPath, MemberRef, Reference};
pub use resolver::{PolicyResolver, RoleResolver, UserResolver};
pub use types::{Account, Member, MemberKind, Policy, Role, RuleDocument, User};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
