//! Role resolution and hydration
//!
//! Roles come back from the directory carrying their members and policies
//! as stored references. Hydration turns those into materialized entities:
//!
//! ```text
//! RoleEntry ─┬─ sub-user paths ──► UserResolver (one batch, cached)
//!            ├─ account paths ───► AccountDirectory (per member, best effort)
//!            └─ policy paths ────► PolicyResolver (one batch)
//! ```
//!
//! The three lookups run concurrently; a failed cross-account lookup only
//! drops that member.

use super::{dedup_references, unresolved_names, PolicyResolver, UserResolver};
use crate::cache::MembershipCache;
use crate::config::RbacConfig;
use crate::error::{EntityKind, RbacError, Result};
use crate::filter::Filter;
use crate::reference::{DirPath, MemberRef, Reference};
use crate::store::{AccountDirectory, Directory, RoleEntry};
use crate::types::{Account, Member, MemberKind, Policy, Role, User};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Resolves role references and hydrates their members and policies
#[derive(Clone)]
pub struct RoleResolver {
    directory: Arc<dyn Directory>,
    accounts: Arc<dyn AccountDirectory>,
    policies: PolicyResolver,
    users: UserResolver,
    cross_account_concurrency: usize,
}

impl RoleResolver {
    pub fn new(directory: Arc<dyn Directory>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self::with_config(directory, accounts, &RbacConfig::default())
    }

    pub fn with_config(
        directory: Arc<dyn Directory>,
        accounts: Arc<dyn AccountDirectory>,
        config: &RbacConfig,
    ) -> Self {
        Self {
            policies: PolicyResolver::new(Arc::clone(&directory)),
            users: UserResolver::new(Arc::clone(&directory)),
            directory,
            accounts,
            cross_account_concurrency: config.cross_account_concurrency.max(1),
        }
    }

    pub fn policies(&self) -> &PolicyResolver {
        &self.policies
    }

    pub fn users(&self) -> &UserResolver {
        &self.users
    }

    fn filter_term(reference: &Reference) -> Filter {
        match reference {
            Reference::Name(name) => Filter::eq("name", name.as_str()),
            Reference::Id(id) => Filter::eq("uuid", id.to_string()),
            Reference::Path(path) => Filter::eq("uuid", path.leaf().1),
        }
    }

    /// Resolve and hydrate roles
    ///
    /// Every [`Reference::Name`] must match a role or the whole call fails
    /// with [`RbacError::UnresolvedReference`] naming each miss. Identifier
    /// and path references are not checked; they come from stored tag sets.
    pub async fn resolve(
        &self,
        cache: &MembershipCache,
        account: Uuid,
        references: &[Reference],
    ) -> Result<Vec<Role>> {
        if references.is_empty() {
            return Ok(Vec::new());
        }

        let filter = Filter::any_of(references.iter().map(Self::filter_term).collect());
        debug!("Role search under {}: {}", account, filter);
        let entries = self.directory.search_roles(account, &filter).await?;

        let missing = unresolved_names(references, |name| entries.iter().any(|e| e.name == name));
        if !missing.is_empty() {
            debug!("Unresolved role names: {:?}", missing);
            return Err(RbacError::unresolved(EntityKind::Role, missing));
        }

        self.hydrate(cache, account, entries).await
    }

    /// Look up exactly one role
    pub async fn get(
        &self,
        cache: &MembershipCache,
        account: Uuid,
        reference: &Reference,
    ) -> Result<Role> {
        let roles = match self.resolve(cache, account, std::slice::from_ref(reference)).await {
            Err(RbacError::UnresolvedReference { .. }) => Vec::new(),
            other => other?,
        };
        roles
            .into_iter()
            .next()
            .ok_or_else(|| RbacError::not_found(EntityKind::Role, reference))
    }

    async fn hydrate(
        &self,
        cache: &MembershipCache,
        account: Uuid,
        entries: Vec<RoleEntry>,
    ) -> Result<Vec<Role>> {
        let parsed: Vec<ParsedRole> = entries.into_iter().map(ParsedRole::new).collect();

        let user_refs = dedup_references(parsed.iter().flat_map(|p| p.members.iter()).filter_map(
            |(member, _)| match member {
                MemberRef::SubUser { account, user } => {
                    Some(Reference::Path(DirPath::sub_user(*account, *user)))
                }
                MemberRef::Plain(raw) => Reference::parse(raw).ok(),
                MemberRef::Account(_) => None,
            },
        ));
        let account_ids: Vec<Uuid> = parsed
            .iter()
            .flat_map(|p| p.members.iter())
            .filter_map(|(member, _)| match member {
                MemberRef::Account(uuid) => Some(*uuid),
                _ => None,
            })
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let policy_refs = dedup_references(parsed.iter().flat_map(|p| p.policies.iter().cloned()));

        let (users, policies, accounts) = tokio::try_join!(
            self.users.resolve(cache, account, &user_refs),
            self.policies.resolve(account, &policy_refs),
            async { Ok::<_, RbacError>(self.hydrate_accounts(cache, account_ids).await) },
        )?;

        let index = HydrationIndex::new(users, policies, accounts);
        Ok(parsed.into_iter().map(|p| index.assemble(p)).collect())
    }

    /// Look up cross-account members concurrently, dropping any that fail
    async fn hydrate_accounts(
        &self,
        cache: &MembershipCache,
        uuids: Vec<Uuid>,
    ) -> HashMap<Uuid, Arc<Account>> {
        let accounts = &self.accounts;
        stream::iter(uuids)
            .map(|uuid| async move {
                if let Some(cached) = cache.account(uuid) {
                    return (uuid, cached);
                }
                match accounts.get_account(uuid).await {
                    Ok(found) => {
                        if found.is_none() {
                            warn!("Dropping cross-account member {}: account not found", uuid);
                        }
                        (uuid, cache.insert_account(uuid, found))
                    }
                    Err(e) => {
                        warn!("Dropping cross-account member {}: {}", uuid, e);
                        (uuid, None)
                    }
                }
            })
            .buffer_unordered(self.cross_account_concurrency)
            .filter_map(|(uuid, account)| async move { account.map(|a| (uuid, a)) })
            .collect()
            .await
    }
}

/// A role entry with its stored references parsed
struct ParsedRole {
    entry: RoleEntry,
    /// Members in stored order, with their default-membership flag
    members: Vec<(MemberRef, bool)>,
    policies: Vec<Reference>,
}

impl ParsedRole {
    fn new(entry: RoleEntry) -> Self {
        let parse = |raw: &String| match MemberRef::parse(raw) {
            Ok(member) => Some(member),
            Err(e) => {
                warn!("Ignoring malformed member of role {}: {}", entry.name, e);
                None
            }
        };

        let defaults: Vec<MemberRef> = entry.default_members.iter().filter_map(parse).collect();
        let mut members: Vec<(MemberRef, bool)> = Vec::new();
        for member in entry.members.iter().filter_map(parse) {
            if !members.iter().any(|(m, _)| *m == member) {
                let default = defaults.contains(&member);
                members.push((member, default));
            }
        }
        for member in defaults {
            if !members.iter().any(|(m, _)| *m == member) {
                members.push((member, true));
            }
        }

        let policies = entry
            .policies
            .iter()
            .filter_map(|raw| match Reference::parse(raw) {
                Ok(reference) => Some(reference),
                Err(e) => {
                    warn!("Ignoring malformed policy of role {}: {}", entry.name, e);
                    None
                }
            })
            .collect();

        Self {
            entry,
            members,
            policies,
        }
    }
}

/// Hydrated entities indexed by every form a stored reference can take
struct HydrationIndex {
    users_by_uuid: HashMap<Uuid, Arc<User>>,
    users_by_login: HashMap<(Uuid, String), Arc<User>>,
    policies_by_uuid: HashMap<Uuid, Policy>,
    policies_by_name: HashMap<String, Uuid>,
    accounts: HashMap<Uuid, Arc<Account>>,
}

impl HydrationIndex {
    fn new(users: Vec<Arc<User>>, policies: Vec<Policy>, accounts: HashMap<Uuid, Arc<Account>>) -> Self {
        let users_by_login = users
            .iter()
            .map(|u| ((u.account, u.login.clone()), Arc::clone(u)))
            .collect();
        let users_by_uuid = users.into_iter().map(|u| (u.uuid, u)).collect();
        let policies_by_name = policies.iter().map(|p| (p.name.clone(), p.uuid)).collect();
        let policies_by_uuid = policies.into_iter().map(|p| (p.uuid, p)).collect();
        Self {
            users_by_uuid,
            users_by_login,
            policies_by_uuid,
            policies_by_name,
            accounts,
        }
    }

    fn member(&self, role_account: Uuid, member: &MemberRef) -> Option<MemberKind> {
        match member {
            MemberRef::SubUser { user, .. } => {
                self.users_by_uuid.get(user).cloned().map(MemberKind::SubUser)
            }
            MemberRef::Account(uuid) => self.accounts.get(uuid).cloned().map(MemberKind::Account),
            MemberRef::Plain(raw) => match Uuid::parse_str(raw) {
                Ok(uuid) => self.users_by_uuid.get(&uuid).cloned(),
                Err(_) => self.users_by_login.get(&(role_account, raw.clone())).cloned(),
            }
            .map(MemberKind::SubUser),
        }
    }

    fn policy(&self, reference: &Reference) -> Option<&Policy> {
        let uuid = match reference {
            Reference::Id(id) => Some(*id),
            Reference::Path(path) => path.leaf_uuid(),
            Reference::Name(name) => self.policies_by_name.get(name).copied(),
        }?;
        self.policies_by_uuid.get(&uuid)
    }

    fn assemble(&self, parsed: ParsedRole) -> Role {
        let ParsedRole {
            entry,
            members,
            policies,
        } = parsed;

        let members = members
            .iter()
            .filter_map(|(member, default)| match self.member(entry.account, member) {
                Some(kind) => Some(Member {
                    kind,
                    default: *default,
                }),
                None => {
                    debug!("Member {:?} of role {} did not hydrate", member, entry.name);
                    None
                }
            })
            .collect();
        let policies = policies
            .iter()
            .filter_map(|reference| self.policy(reference).cloned())
            .collect();

        Role {
            uuid: entry.uuid,
            account: entry.account,
            name: entry.name,
            policies,
            members,
        }
    }
}
