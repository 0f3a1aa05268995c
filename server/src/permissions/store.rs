//! Lookups the permission engine consumes.
//!
//! Persistence of channels, roles, bindings and overrides lives outside this
//! module. The engine only sees it through [`PermissionStore`].
//! [`MemoryPermissionStore`] backs tests and the snapshot CLI.

use std::collections::HashSet;
use std::fmt;

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::capability::ChannelPermissions;
use super::models::{
    ChannelInfo, GroupMembership, MemberOverride, PermissionTemplate, RoleBinding,
};
use super::resolver::PermissionError;
use super::validation::{check_inheritance_closed, validate_binding, validate_override};

/// Kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Channel,
    User,
    Binding,
    Template,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Channel => "Channel",
            Self::User => "User",
            Self::Binding => "Binding",
            Self::Template => "Template",
        };
        f.write_str(name)
    }
}

/// Errors raised by a [`PermissionStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Uuid },

    #[error("Permission store unavailable: {0}")]
    Unavailable(String),
}

/// Collaborator lookups used by the resolver and the invalidation coordinator.
///
/// Implementations must be cheap to call concurrently; the resolver issues
/// blocking reads on the calling thread.
pub trait PermissionStore: Send + Sync {
    /// Load a channel. Unknown channels are `StoreError::NotFound`.
    fn find_channel(&self, channel_id: Uuid) -> Result<ChannelInfo, StoreError>;

    /// Roles a user holds in a group.
    ///
    /// `Ok(None)` means the user exists but is not a member of the group.
    fn find_roles_of_user_in_group(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Vec<Uuid>>, StoreError>;

    /// Bindings of `channel_id` whose role is in `role_ids`.
    fn find_bindings(
        &self,
        channel_id: Uuid,
        role_ids: &[Uuid],
    ) -> Result<Vec<RoleBinding>, StoreError>;

    fn find_override(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MemberOverride>, StoreError>;

    /// Channels that have at least one binding created from `template_id`.
    fn find_channels_using_template(&self, template_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    /// Channels of `group_id` that have at least one binding.
    fn find_channels_with_bindings_in_group(&self, group_id: Uuid)
        -> Result<Vec<Uuid>, StoreError>;

    fn is_channel_public(&self, channel_id: Uuid) -> Result<bool, StoreError> {
        self.find_channel(channel_id).map(|c| c.is_public)
    }
}

impl<S: PermissionStore + ?Sized> PermissionStore for std::sync::Arc<S> {
    fn find_channel(&self, channel_id: Uuid) -> Result<ChannelInfo, StoreError> {
        (**self).find_channel(channel_id)
    }

    fn find_roles_of_user_in_group(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Vec<Uuid>>, StoreError> {
        (**self).find_roles_of_user_in_group(group_id, user_id)
    }

    fn find_bindings(
        &self,
        channel_id: Uuid,
        role_ids: &[Uuid],
    ) -> Result<Vec<RoleBinding>, StoreError> {
        (**self).find_bindings(channel_id, role_ids)
    }

    fn find_override(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MemberOverride>, StoreError> {
        (**self).find_override(channel_id, user_id)
    }

    fn find_channels_using_template(&self, template_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        (**self).find_channels_using_template(template_id)
    }

    fn find_channels_with_bindings_in_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<Uuid>, StoreError> {
        (**self).find_channels_with_bindings_in_group(group_id)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Serialized form of a [`MemoryPermissionStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
    #[serde(default)]
    pub users: Vec<Uuid>,
    #[serde(default)]
    pub memberships: Vec<GroupMembership>,
    #[serde(default)]
    pub templates: Vec<PermissionTemplate>,
    #[serde(default)]
    pub bindings: Vec<RoleBinding>,
    #[serde(default)]
    pub overrides: Vec<MemberOverride>,
}

/// Thread-safe in-memory [`PermissionStore`].
///
/// Mutators validate their input the way a persistent write path must, but
/// do not touch any cache. Callers pair each mutation with the matching
/// [`InvalidationCoordinator`](super::InvalidationCoordinator) event.
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    channels: DashMap<Uuid, ChannelInfo>,
    users: DashSet<Uuid>,
    memberships: DashMap<(Uuid, Uuid), Vec<Uuid>>,
    templates: DashMap<Uuid, PermissionTemplate>,
    /// Bindings keyed by channel.
    bindings: DashMap<Uuid, Vec<RoleBinding>>,
    overrides: DashMap<(Uuid, Uuid), MemberOverride>,
}

impl MemoryPermissionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot, validating every record.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, PermissionError> {
        let store = Self::new();
        for channel in snapshot.channels {
            store.insert_channel(channel);
        }
        for user in snapshot.users {
            store.insert_user(user);
        }
        for membership in snapshot.memberships {
            store.set_membership(membership.group_id, membership.user_id, membership.role_ids);
        }
        for template in snapshot.templates {
            store.upsert_template(template)?;
        }
        for binding in snapshot.bindings {
            store.upsert_binding(binding)?;
        }
        for member_override in snapshot.overrides {
            store.set_override(member_override)?;
        }
        Ok(store)
    }

    pub fn insert_channel(&self, channel: ChannelInfo) {
        self.channels.insert(channel.id, channel);
    }

    pub fn insert_user(&self, user_id: Uuid) {
        self.users.insert(user_id);
    }

    /// Replace the roles a user holds in a group. Registers the user if needed.
    pub fn set_membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        role_ids: Vec<Uuid>,
    ) {
        self.users.insert(user_id);
        self.memberships.insert((group_id, user_id), role_ids);
    }

    /// Remove a user from a group. Returns `true` if they were a member.
    pub fn remove_membership(&self, group_id: Uuid, user_id: Uuid) -> bool {
        self.memberships.remove(&(group_id, user_id)).is_some()
    }

    /// Insert or replace a binding.
    ///
    /// If the binding references a known template, its template permissions
    /// are taken from the template.
    pub fn upsert_binding(&self, mut binding: RoleBinding) -> Result<(), PermissionError> {
        if !self.channels.contains_key(&binding.channel_id) {
            return Err(StoreError::NotFound {
                entity: Entity::Channel,
                id: binding.channel_id,
            }
            .into());
        }
        if let Some(template_id) = binding.template_id {
            let template = self.templates.get(&template_id).ok_or(StoreError::NotFound {
                entity: Entity::Template,
                id: template_id,
            })?;
            binding.template_permissions = template.permissions;
        }
        validate_binding(&binding)?;

        let mut bindings = self.bindings.entry(binding.channel_id).or_default();
        if let Some(existing) = bindings.iter_mut().find(|b| b.id == binding.id) {
            *existing = binding;
        } else {
            bindings.push(binding);
        }
        Ok(())
    }

    /// Remove a binding by id, returning it.
    pub fn remove_binding(&self, binding_id: Uuid) -> Result<RoleBinding, PermissionError> {
        for mut entry in self.bindings.iter_mut() {
            if let Some(pos) = entry.iter().position(|b| b.id == binding_id) {
                return Ok(entry.remove(pos));
            }
        }
        Err(StoreError::NotFound {
            entity: Entity::Binding,
            id: binding_id,
        }
        .into())
    }

    pub fn set_override(&self, member_override: MemberOverride) -> Result<(), PermissionError> {
        validate_override(&member_override)?;
        self.overrides.insert(
            (member_override.channel_id, member_override.user_id),
            member_override,
        );
        Ok(())
    }

    pub fn remove_override(&self, channel_id: Uuid, user_id: Uuid) -> Option<MemberOverride> {
        self.overrides
            .remove(&(channel_id, user_id))
            .map(|(_, ovr)| ovr)
    }

    /// Insert or replace a template and refresh every binding created from it.
    ///
    /// Fails without changing anything if a refreshed binding would conflict
    /// with its own deny.
    pub fn upsert_template(&self, template: PermissionTemplate) -> Result<(), PermissionError> {
        check_inheritance_closed(template.permissions)?;

        for entry in &self.bindings {
            for binding in entry.iter().filter(|b| b.template_id == Some(template.id)) {
                let mut refreshed = binding.clone();
                refreshed.template_permissions = template.permissions;
                validate_binding(&refreshed)?;
            }
        }

        for mut entry in self.bindings.iter_mut() {
            for binding in entry
                .iter_mut()
                .filter(|b| b.template_id == Some(template.id))
            {
                binding.template_permissions = template.permissions;
            }
        }
        self.templates.insert(template.id, template);
        Ok(())
    }

    /// Current permissions of a template, if it exists.
    #[must_use]
    pub fn template_permissions(&self, template_id: Uuid) -> Option<ChannelPermissions> {
        self.templates.get(&template_id).map(|t| t.permissions)
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn find_channel(&self, channel_id: Uuid) -> Result<ChannelInfo, StoreError> {
        self.channels
            .get(&channel_id)
            .map(|c| *c)
            .ok_or(StoreError::NotFound {
                entity: Entity::Channel,
                id: channel_id,
            })
    }

    fn find_roles_of_user_in_group(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Vec<Uuid>>, StoreError> {
        if !self.users.contains(&user_id) {
            return Err(StoreError::NotFound {
                entity: Entity::User,
                id: user_id,
            });
        }
        Ok(self
            .memberships
            .get(&(group_id, user_id))
            .map(|roles| roles.value().clone()))
    }

    fn find_bindings(
        &self,
        channel_id: Uuid,
        role_ids: &[Uuid],
    ) -> Result<Vec<RoleBinding>, StoreError> {
        let roles: HashSet<&Uuid> = role_ids.iter().collect();
        Ok(self
            .bindings
            .get(&channel_id)
            .map(|bindings| {
                bindings
                    .iter()
                    .filter(|b| roles.contains(&b.role_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn find_override(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MemberOverride>, StoreError> {
        Ok(self
            .overrides
            .get(&(channel_id, user_id))
            .map(|ovr| ovr.value().clone()))
    }

    fn find_channels_using_template(&self, template_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .bindings
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .iter()
                    .any(|b| b.template_id == Some(template_id))
            })
            .map(|entry| *entry.key())
            .collect())
    }

    fn find_channels_with_bindings_in_group(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .bindings
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .filter(|entry| {
                self.channels
                    .get(entry.key())
                    .is_some_and(|c| c.group_id == group_id)
            })
            .map(|entry| *entry.key())
            .collect())
    }
}
