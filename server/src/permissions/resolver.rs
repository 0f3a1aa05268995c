//! Permission resolution logic.
//!
//! Computes effective capabilities for a user in a channel and answers
//! capability checks through the version cache.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::cache::PermissionCache;
use super::capability::ChannelPermissions;
use super::config::PermissionConfig;
use super::invalidation::{InvalidationCoordinator, PermissionEvent};
use super::models::{MemberOverride, RoleBinding};
use super::store::{Entity, PermissionStore, StoreError};

/// Aggregate the bindings that apply to a user.
///
/// Each binding's deny only cancels that binding's own grants, so a deny on
/// one role never suppresses a grant coming from another role.
pub fn aggregate_bindings(bindings: &[RoleBinding]) -> ChannelPermissions {
    bindings
        .iter()
        .fold(ChannelPermissions::empty(), |acc, b| acc | b.contribution())
}

/// Apply the member override, if any, after role aggregation.
pub fn apply_member_override(
    aggregate: ChannelPermissions,
    member_override: Option<&MemberOverride>,
) -> ChannelPermissions {
    member_override.map_or(aggregate, |ovr| ovr.apply(aggregate))
}

/// Compute the final capability mask from already-loaded data.
///
/// Resolution order:
/// 1. No bound role: `VIEW_CHANNEL` only, and only in a public channel
/// 2. Aggregate role bindings
/// 3. Apply the member override
/// 4. Expand through the implication graph
pub fn compute_channel_permissions(
    bound: &[RoleBinding],
    member_override: Option<&MemberOverride>,
    channel_is_public: bool,
) -> ChannelPermissions {
    if bound.is_empty() {
        return if channel_is_public {
            ChannelPermissions::VIEW_CHANNEL
        } else {
            ChannelPermissions::empty()
        };
    }

    apply_member_override(aggregate_bindings(bound), member_override).expand()
}

/// Whether `mask` allows `capability`.
///
/// The view-gate is always required, whatever was requested.
#[must_use]
pub const fn permits(mask: ChannelPermissions, capability: ChannelPermissions) -> bool {
    mask.contains(ChannelPermissions::GATE.union(capability))
}

/// Resolves channel capabilities against a [`PermissionStore`], memoizing
/// single-capability answers in a version-keyed cache.
pub struct PermissionResolver<S> {
    store: S,
    coordinator: Arc<InvalidationCoordinator>,
    cache: PermissionCache,
    cache_enabled: bool,
}

impl<S: PermissionStore> PermissionResolver<S> {
    /// Create a resolver with its own invalidation coordinator.
    pub fn new(store: S, config: &PermissionConfig) -> Self {
        let coordinator = Arc::new(InvalidationCoordinator::new(config.event_buffer));
        Self::with_coordinator(store, coordinator, config)
    }

    /// Create a resolver sharing an existing coordinator.
    pub fn with_coordinator(
        store: S,
        coordinator: Arc<InvalidationCoordinator>,
        config: &PermissionConfig,
    ) -> Self {
        Self {
            cache: PermissionCache::new(Arc::clone(&coordinator), config.max_cache_entries),
            store,
            coordinator,
            cache_enabled: config.cache_enabled,
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn coordinator(&self) -> &Arc<InvalidationCoordinator> {
        &self.coordinator
    }

    pub const fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// Check whether a user holds `capability` in a channel.
    ///
    /// Not having the capability is `Ok(false)`. Unknown channels or users
    /// are returned as `PermissionError::NotFound`.
    #[tracing::instrument(skip(self))]
    pub fn has_capability(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        capability: ChannelPermissions,
    ) -> Result<bool, PermissionError> {
        if !self.cache_enabled {
            return Ok(permits(self.compute(channel_id, user_id)?, capability));
        }

        // The answer is stored under the version read before any lookup, so a
        // bump that lands mid-computation leaves it unreachable.
        let version = self.coordinator.current_version(channel_id);
        if let Some(allowed) = self.cache.get_at(version, channel_id, user_id, capability) {
            debug!(version, allowed, "Permission cache hit");
            return Ok(allowed);
        }

        let allowed = permits(self.compute(channel_id, user_id)?, capability);
        self.cache
            .put_at(version, channel_id, user_id, capability, allowed);
        debug!(version, allowed, "Permission cache miss");
        Ok(allowed)
    }

    /// Full set of capabilities a user holds in a channel.
    ///
    /// Returned exactly as computed; no gate filtering is applied.
    #[tracing::instrument(skip(self))]
    pub fn effective_capabilities(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> Result<ChannelPermissions, PermissionError> {
        self.compute(channel_id, user_id)
    }

    /// Like [`Self::has_capability`], but a denial is `MissingPermission`.
    pub fn require_capability(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        capability: ChannelPermissions,
    ) -> Result<(), PermissionError> {
        if self.has_capability(channel_id, user_id, capability)? {
            Ok(())
        } else {
            Err(PermissionError::MissingPermission(capability))
        }
    }

    /// Keep only the channels the user can see.
    #[tracing::instrument(skip(self, channel_ids), fields(count = channel_ids.len()))]
    pub fn filter_visible_channels(
        &self,
        user_id: Uuid,
        channel_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, PermissionError> {
        let mut visible = Vec::with_capacity(channel_ids.len());
        for &channel_id in channel_ids {
            if self.has_capability(channel_id, user_id, ChannelPermissions::VIEW_CHANNEL)? {
                visible.push(channel_id);
            }
        }
        Ok(visible)
    }

    /// Feed a mutation event to the coordinator.
    pub fn handle_event(&self, event: PermissionEvent) -> Result<HashMap<Uuid, u64>, PermissionError> {
        self.coordinator.handle(&self.store, event)
    }

    /// Force-clear cached answers for one channel.
    ///
    /// Returns the channel's new version.
    pub fn clear_channel_cache(&self, channel_id: Uuid) -> u64 {
        let version = self.coordinator.reset(channel_id);
        let purged = self.cache.purge_channel(channel_id);
        info!(%channel_id, version, purged, "Cleared channel permission cache");
        version
    }

    /// Force-clear cached answers for every channel.
    pub fn clear_all_caches(&self) {
        let channels = self.coordinator.reset_all();
        self.cache.clear();
        info!(channels, "Cleared all permission caches");
    }

    fn compute(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
    ) -> Result<ChannelPermissions, PermissionError> {
        let channel = self.store.find_channel(channel_id)?;

        let Some(role_ids) = self
            .store
            .find_roles_of_user_in_group(channel.group_id, user_id)?
        else {
            return Ok(ChannelPermissions::empty());
        };

        let bound = if role_ids.is_empty() {
            Vec::new()
        } else {
            self.store.find_bindings(channel_id, &role_ids)?
        };
        if bound.is_empty() {
            return Ok(compute_channel_permissions(&[], None, channel.is_public));
        }

        let member_override = self.store.find_override(channel_id, user_id)?;
        Ok(compute_channel_permissions(
            &bound,
            member_override.as_ref(),
            channel.is_public,
        ))
    }
}

/// Permission check errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    /// User lacks required permission.
    #[error("Missing permission: {0:?}")]
    MissingPermission(ChannelPermissions),

    /// A binding or override grants and denies the same capabilities.
    #[error("Permissions both granted and denied: {0:?}")]
    Conflict(ChannelPermissions),

    /// A coarse capability is granted while something it implies is denied.
    #[error("{granted:?} is granted but implied {denied:?} is denied")]
    InheritanceInconsistency {
        granted: ChannelPermissions,
        denied: ChannelPermissions,
    },

    /// A grant set is missing capabilities its members imply.
    #[error("{granted:?} is missing implied {missing:?}")]
    InheritanceNotClosed {
        granted: ChannelPermissions,
        missing: ChannelPermissions,
    },

    /// Channel, user, binding or template absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Uuid },

    /// The backing store failed.
    #[error("Permission store error: {0}")]
    Store(String),
}

impl From<StoreError> for PermissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Unavailable(msg) => Self::Store(msg),
        }
    }
}
