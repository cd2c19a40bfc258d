//! Shared resolution layer
//!
//! Policy, user and role resolution live together in this one module so
//! that code mutating roles and code mutating users can both depend on it
//! without depending on each other. Every resolver takes the request's
//! [`MembershipCache`](crate::cache::MembershipCache) by parameter.

mod policy;
mod role;
mod user;

pub use policy::PolicyResolver;
pub use role::RoleResolver;
pub use user::UserResolver;

use crate::reference::Reference;
use std::collections::HashSet;

/// Name references that `found` does not account for, in input order without duplicates
fn unresolved_names(references: &[Reference], found: impl Fn(&str) -> bool) -> Vec<String> {
    let mut seen = HashSet::new();
    references
        .iter()
        .filter_map(Reference::as_name)
        .filter(|name| !found(*name) && seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Drop repeated references while keeping the first occurrence
fn dedup_references(references: impl IntoIterator<Item = Reference>) -> Vec<Reference> {
    let mut seen = HashSet::new();
    references
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_names_only_checks_names() {
        let refs = vec![
            Reference::name("admin"),
            Reference::name("ghost"),
            Reference::Id(uuid::Uuid::new_v4()),
            Reference::name("ghost"),
        ];
        assert_eq!(unresolved_names(&refs, |n| n == "admin"), vec!["ghost".to_string()]);
    }

    #[test]
    fn test_dedup_references() {
        let refs = dedup_references(Reference::names(["a", "b", "a"]));
        assert_eq!(refs, Reference::names(["a", "b"]));
    }
}
