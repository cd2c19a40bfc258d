//! Resource role-tag bindings
//!
//! A resource's role tags live in one of two places:
//!
//! - **Instances** keep them on the instance itself, written through the
//!   instance inventory. The binding always exists and only toggles between
//!   having tags and having none.
//! - **Everything else** keeps them in a directory binding record, created
//!   on first tagging and removed when the last tag goes away.
//!
//! Externally tags are always role names; stored, they are role UUIDs on
//! instances and role paths in binding records.

use crate::canonical::ResourceName;
use crate::config::RbacConfig;
use crate::context::{format_role_tag_header, Instance, LoadedResource, RequestContext, ResourceKind};
use crate::error::{RbacError, Result};
use crate::reference::Reference;
use crate::resolver::RoleResolver;
use crate::store::{AccountDirectory, BindingRecord, Directory, InstanceInventory};
use crate::types::Role;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of a save that wrote something
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTags {
    pub name: ResourceName,
    pub roles: Vec<String>,
}

/// Loads, saves and deletes the role-tag set attached to a named resource
pub struct ResourceRoleBinding {
    roles: RoleResolver,
    directory: Arc<dyn Directory>,
    inventory: Arc<dyn InstanceInventory>,
    config: RbacConfig,
}

impl ResourceRoleBinding {
    pub fn new(
        directory: Arc<dyn Directory>,
        inventory: Arc<dyn InstanceInventory>,
        accounts: Arc<dyn AccountDirectory>,
        config: RbacConfig,
    ) -> Self {
        Self {
            roles: RoleResolver::with_config(Arc::clone(&directory), accounts, &config),
            directory,
            inventory,
            config,
        }
    }

    pub fn role_resolver(&self) -> &RoleResolver {
        &self.roles
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    /// Load the current role set of `name` into the request context
    ///
    /// `instance` must be supplied exactly when `name` denotes a compute
    /// instance. A generic resource that was never tagged loads with an
    /// empty role set.
    pub async fn load_resource(
        &self,
        ctx: &mut RequestContext,
        name: ResourceName,
        instance: Option<Instance>,
    ) -> Result<()> {
        let account = ctx.account().uuid;

        let resource = match (name.is_instance(), instance) {
            (true, Some(mut instance)) => {
                let roles = self.load_instance_roles(ctx, account, &instance).await?;
                instance.role_tags = roles.iter().map(|r| r.name.clone()).collect();
                LoadedResource {
                    name,
                    account,
                    id: None,
                    kind: ResourceKind::Instance(instance),
                    roles,
                }
            }
            (false, None) => {
                let record = self.directory.get_binding(account, name.as_str()).await?;
                let (id, roles) = match record {
                    Some(record) if !record.roles.is_empty() => {
                        let references: Vec<Reference> =
                            record.roles.iter().cloned().map(Reference::Path).collect();
                        let roles = self.roles.resolve(&ctx.cache, account, &references).await?;
                        (Some(record.id), roles)
                    }
                    Some(record) => (Some(record.id), Vec::new()),
                    None => {
                        debug!("No role-tag binding for {}", name);
                        (None, Vec::new())
                    }
                };
                LoadedResource {
                    name,
                    account,
                    id,
                    kind: ResourceKind::Virtual,
                    roles,
                }
            }
            (true, None) => {
                return Err(RbacError::InvalidInput(format!(
                    "Instance resource {} loaded without its instance",
                    name
                )))
            }
            (false, Some(_)) => {
                return Err(RbacError::InvalidInput(format!("{} is not an instance resource", name)))
            }
        };

        debug!("Loaded {} with {} role tag(s)", resource.name, resource.roles.len());
        ctx.resource = Some(resource);
        Ok(())
    }

    async fn load_instance_roles(
        &self,
        ctx: &RequestContext,
        account: Uuid,
        instance: &Instance,
    ) -> Result<Vec<Role>> {
        if instance.role_tags.is_empty() {
            return Ok(Vec::new());
        }

        let references: Vec<Reference> = instance
            .role_tags
            .iter()
            .filter_map(|tag| match Reference::parse(tag) {
                Ok(reference @ Reference::Id(_)) => Some(reference),
                _ => {
                    warn!("Ignoring malformed role tag '{}' on instance {}", tag, instance.uuid);
                    None
                }
            })
            .collect();

        self.roles.resolve(&ctx.cache, account, &references).await
    }

    /// Determine the desired role set for the loaded resource and persist it
    ///
    /// Returns `Ok(None)` when there is nothing to persist.
    pub async fn save_resource(&self, ctx: &mut RequestContext) -> Result<Option<SavedTags>> {
        let account = ctx.account().uuid;
        let Some(loaded) = ctx.resource.as_ref() else {
            return Err(RbacError::InvalidInput("No resource loaded".to_string()));
        };

        let desired = if let Some(names) = &ctx.role_tags {
            let references = Reference::names(names.iter().cloned());
            self.roles.resolve(&ctx.cache, account, &references).await?
        } else if !loaded.roles.is_empty() {
            loaded.roles.clone()
        } else if !ctx.caller.active_roles.is_empty() {
            ctx.caller.active_roles.clone()
        } else if ctx.caller.is_sub_user() {
            Vec::new()
        } else {
            debug!("Nothing to persist for {}", loaded.name);
            return Ok(None);
        };

        let Some(resource) = ctx.resource.as_mut() else {
            return Err(RbacError::InvalidInput("No resource loaded".to_string()));
        };

        match &mut resource.kind {
            ResourceKind::Instance(instance) => {
                self.write_instance_tags(instance, &desired).await?;
                instance.role_tags = desired.iter().map(|r| r.name.clone()).collect();
            }
            ResourceKind::Virtual => {
                resource.id = self.write_binding(resource.account, &resource.name, resource.id, &desired).await?;
            }
        }

        resource.roles = desired;
        let saved = SavedTags {
            name: resource.name.clone(),
            roles: resource.role_names(),
        };
        info!("Saved role tags for {}: {:?}", saved.name, saved.roles);
        Ok(Some(saved))
    }

    /// Set or clear tags on the instance; failures surface only as an invalid role tag
    async fn write_instance_tags(&self, instance: &Instance, desired: &[Role]) -> Result<()> {
        let result = if desired.is_empty() {
            self.inventory.clear_role_tags(instance.uuid, instance.owner).await
        } else {
            let uuids: Vec<Uuid> = desired.iter().map(|r| r.uuid).collect();
            self.inventory.set_role_tags(instance.uuid, instance.owner, &uuids).await
        };

        result.map_err(|e| {
            error!("Role-tag write for instance {} failed: {}", instance.uuid, e);
            RbacError::InvalidRoleTag
        })
    }

    /// Upsert or remove the binding record; returns the record identifier afterwards
    async fn write_binding(
        &self,
        account: Uuid,
        name: &ResourceName,
        id: Option<Uuid>,
        desired: &[Role],
    ) -> Result<Option<Uuid>> {
        if desired.is_empty() {
            if let Some(id) = id {
                self.directory.delete_binding(account, id).await?;
                info!("Removed last role tag from {}", name);
            }
            return Ok(None);
        }

        let record = match id {
            Some(id) => BindingRecord {
                id,
                account,
                name: name.to_string(),
                roles: desired.iter().map(Role::path).collect(),
                updated_at: Utc::now(),
            },
            None => BindingRecord::new(account, name.as_str(), desired.iter().map(Role::path).collect()),
        };
        self.directory.put_binding(&record).await?;
        Ok(Some(record.id))
    }

    /// Names of the currently loaded role set
    pub fn get_role_tags(ctx: &RequestContext) -> Vec<String> {
        ctx.resource
            .as_ref()
            .map(LoadedResource::role_names)
            .unwrap_or_default()
    }

    /// Remove the binding record after the resource itself was deleted
    ///
    /// Only generic resources with a record are affected, and only when the
    /// deleting operation succeeded. Failures are logged, never returned.
    pub async fn delete_resource(&self, ctx: &mut RequestContext, succeeded: bool) {
        if !succeeded {
            return;
        }
        let Some(resource) = ctx.resource.as_mut() else {
            return;
        };
        let (ResourceKind::Virtual, Some(id)) = (&resource.kind, resource.id) else {
            return;
        };

        match self.directory.delete_binding(resource.account, id).await {
            Ok(()) => {
                info!("Deleted role-tag binding for {}", resource.name);
                resource.id = None;
                resource.roles.clear();
            }
            Err(e) => warn!("Failed to delete role-tag binding for {}: {}", resource.name, e),
        }
    }

    /// Response header exposing the current tag set, when there is one
    pub fn response_header(&self, ctx: &RequestContext) -> Option<(String, String)> {
        let tags = Self::get_role_tags(ctx);
        if tags.is_empty() {
            return None;
        }
        Some((self.config.role_tag_header.clone(), format_role_tag_header(&tags)))
    }
}
