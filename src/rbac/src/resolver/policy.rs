//! Policy resolution

use crate::error::{EntityKind, RbacError, Result};
use crate::filter::Filter;
use crate::reference::Reference;
use crate::store::{Directory, PolicyEntry};
use crate::types::Policy;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Resolves policy references with one directory search per call
///
/// No completeness check is made here; callers that need every reference
/// resolved compare the result against their input.
#[derive(Clone)]
pub struct PolicyResolver {
    directory: Arc<dyn Directory>,
}

impl PolicyResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    fn filter_term(reference: &Reference) -> Filter {
        match reference {
            Reference::Name(name) => Filter::eq("name", name.as_str()),
            Reference::Id(id) => Filter::eq("uuid", id.to_string()),
            Reference::Path(path) => Filter::eq("uuid", path.leaf().1),
        }
    }

    pub async fn resolve(&self, account: Uuid, references: &[Reference]) -> Result<Vec<Policy>> {
        if references.is_empty() {
            return Ok(Vec::new());
        }

        let filter = Filter::any_of(references.iter().map(Self::filter_term).collect());
        debug!("Policy search under {}: {}", account, filter);

        let entries = self.directory.search_policies(account, &filter).await?;
        Ok(entries.into_iter().map(policy_from_entry).collect())
    }

    /// Look up exactly one policy
    pub async fn get(&self, account: Uuid, reference: &Reference) -> Result<Policy> {
        self.resolve(account, std::slice::from_ref(reference))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RbacError::not_found(EntityKind::Policy, reference))
    }
}

fn policy_from_entry(entry: PolicyEntry) -> Policy {
    Policy {
        uuid: entry.uuid,
        account: entry.account,
        name: entry.name,
        rules: entry.rules.into_document(),
        description: entry.description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::DirPath;
    use crate::store::{InMemoryDirectory, StoredRules};
    use crate::types::RuleDocument;

    async fn seeded() -> (Arc<InMemoryDirectory>, Uuid, Uuid) {
        let directory = Arc::new(InMemoryDirectory::new());
        let account = Uuid::new_v4();
        let read_only = Uuid::new_v4();
        directory
            .add_policy(PolicyEntry {
                uuid: read_only,
                account,
                name: "read-only".to_string(),
                rules: StoredRules::Serialized(r#"["CAN listmachines"]"#.to_string()),
                description: None,
            })
            .await;
        directory
            .add_policy(PolicyEntry {
                uuid: Uuid::new_v4(),
                account,
                name: "legacy".to_string(),
                rules: StoredRules::Serialized("not json".to_string()),
                description: Some("pre-migration".to_string()),
            })
            .await;
        (directory, account, read_only)
    }

    #[tokio::test]
    async fn test_batch_is_one_search() {
        let (directory, account, _) = seeded().await;
        let resolver = PolicyResolver::new(directory.clone());

        let policies = resolver
            .resolve(account, &Reference::names(["read-only", "legacy"]))
            .await
            .unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(directory.calls().policy_searches, 1);
    }

    #[tokio::test]
    async fn test_rule_document_fallback() {
        let (directory, account, _) = seeded().await;
        let resolver = PolicyResolver::new(directory);

        let legacy = resolver.get(account, &Reference::name("legacy")).await.unwrap();
        assert_eq!(legacy.rules, RuleDocument::Raw("not json".to_string()));

        let read_only = resolver.get(account, &Reference::name("read-only")).await.unwrap();
        assert_eq!(read_only.rules, RuleDocument::Rules(vec!["CAN listmachines".to_string()]));
    }

    #[tokio::test]
    async fn test_resolve_by_path_and_id() {
        let (directory, account, read_only) = seeded().await;
        let resolver = PolicyResolver::new(directory);

        let by_path = resolver
            .get(account, &Reference::Path(DirPath::policy(account, read_only)))
            .await
            .unwrap();
        let by_id = resolver.get(account, &Reference::Id(read_only)).await.unwrap();
        assert_eq!(by_path, by_id);
    }

    #[tokio::test]
    async fn test_missing_is_not_an_error_in_batch() {
        let (directory, account, _) = seeded().await;
        let resolver = PolicyResolver::new(directory);

        let policies = resolver
            .resolve(account, &Reference::names(["read-only", "ghost"]))
            .await
            .unwrap();
        assert_eq!(policies.len(), 1);

        let err = resolver.get(account, &Reference::name("ghost")).await.unwrap_err();
        assert!(matches!(err, RbacError::NotFound { kind: EntityKind::Policy, .. }));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_backend() {
        let (directory, account, _) = seeded().await;
        let resolver = PolicyResolver::new(directory.clone());
        assert!(resolver.resolve(account, &[]).await.unwrap().is_empty());
        assert_eq!(directory.calls().policy_searches, 0);
    }
}
