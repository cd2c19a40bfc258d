//! Sub-user resolution, including users beneath other accounts

use super::dedup_references;
use crate::cache::MembershipCache;
use crate::error::{EntityKind, RbacError, Result};
use crate::filter::Filter;
use crate::reference::Reference;
use crate::store::Directory;
use crate::types::User;
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Resolves user references through the request's [`MembershipCache`]
///
/// References already cached are answered without touching the directory;
/// the rest are batched into one search per owning account. Result order
/// does not follow input order.
#[derive(Clone)]
pub struct UserResolver {
    directory: Arc<dyn Directory>,
}

impl UserResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(
        &self,
        cache: &MembershipCache,
        account: Uuid,
        references: &[Reference],
    ) -> Result<Vec<Arc<User>>> {
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();
        let mut pending: HashMap<Uuid, Vec<Filter>> = HashMap::new();

        for reference in dedup_references(references.iter().cloned()) {
            let (scope, cached, term) = match &reference {
                Reference::Name(login) => (
                    account,
                    cache.user_by_login(account, login),
                    Filter::eq("login", login.as_str()),
                ),
                Reference::Id(id) => (account, cache.user_by_uuid(*id), Filter::eq("uuid", id.to_string())),
                Reference::Path(path) => (
                    path.owner_account().unwrap_or(account),
                    path.leaf_uuid().and_then(|id| cache.user_by_uuid(id)),
                    Filter::eq("uuid", path.leaf().1),
                ),
            };

            match cached {
                Some(user) => {
                    if seen.insert(user.uuid) {
                        resolved.push(user);
                    }
                }
                None => pending.entry(scope).or_default().push(term),
            }
        }

        if pending.is_empty() {
            debug!("All {} user reference(s) answered from cache", resolved.len());
            return Ok(resolved);
        }

        let searches = pending.into_iter().map(|(scope, terms)| {
            let filter = Filter::any_of(terms);
            async move {
                debug!("User search under {}: {}", scope, filter);
                self.directory.search_users(scope, &filter).await
            }
        });

        for entries in try_join_all(searches).await? {
            for entry in entries {
                let user = cache.insert_user(User {
                    uuid: entry.uuid,
                    account: entry.account,
                    login: entry.login,
                });
                if seen.insert(user.uuid) {
                    resolved.push(user);
                }
            }
        }

        Ok(resolved)
    }

    /// Look up exactly one user
    pub async fn get(
        &self,
        cache: &MembershipCache,
        account: Uuid,
        reference: &Reference,
    ) -> Result<Arc<User>> {
        self.resolve(cache, account, std::slice::from_ref(reference))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RbacError::not_found(EntityKind::User, reference))
    }
}
