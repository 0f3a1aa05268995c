//! Per-channel version counters and mutation event intake.
//!
//! Cache keys embed the channel version, so bumping a channel is all it
//! takes to invalidate every answer cached for it. Versions start at 1, only
//! move forward, and are never reused.
//!
//! Counters live in process memory. Running more than one resolver process
//! against the same data needs a shared counter store with atomic increment
//! instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::resolver::PermissionError;
use super::store::PermissionStore;

/// Version a channel has before its first bump.
pub const INITIAL_VERSION: u64 = 1;

/// Default capacity of the bump notification channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// A mutation that can change permission answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionEvent {
    /// A role binding of the channel was created, updated or deleted.
    RoleBindingChanged { channel_id: Uuid },
    /// A permission template changed; every binding built from it changed too.
    TemplateChanged { template_id: Uuid },
    /// A user's roles in a group changed.
    MemberRolesChanged { group_id: Uuid, user_id: Uuid },
    /// A member override was created, updated or deleted.
    MemberOverrideChanged { channel_id: Uuid, user_id: Uuid },
}

/// Published after every version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionBump {
    pub channel_id: Uuid,
    pub version: u64,
}

/// Owns the channel version counters.
pub struct InvalidationCoordinator {
    versions: DashMap<Uuid, Arc<AtomicU64>>,
    bumps: broadcast::Sender<VersionBump>,
}

impl Default for InvalidationCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl InvalidationCoordinator {
    /// Create a coordinator whose bump channel buffers `event_buffer` messages.
    pub fn new(event_buffer: usize) -> Self {
        let (bumps, _) = broadcast::channel(event_buffer.max(1));
        Self {
            versions: DashMap::new(),
            bumps,
        }
    }

    /// Get or create the counter for a channel.
    fn channel_counter(&self, channel_id: Uuid) -> Arc<AtomicU64> {
        if let Some(counter) = self.versions.get(&channel_id) {
            return Arc::clone(&counter);
        }
        self.versions
            .entry(channel_id)
            .or_insert_with(|| Arc::new(AtomicU64::new(INITIAL_VERSION)))
            .clone()
    }

    /// Current version of a channel, creating it at 1 on first access.
    pub fn current_version(&self, channel_id: Uuid) -> u64 {
        self.channel_counter(channel_id).load(Ordering::Acquire)
    }

    /// Current version without creating a counter.
    pub(crate) fn peek_version(&self, channel_id: Uuid) -> u64 {
        self.versions
            .get(&channel_id)
            .map_or(INITIAL_VERSION, |counter| counter.load(Ordering::Acquire))
    }

    /// Advance a channel's version, returning the new one.
    pub fn bump(&self, channel_id: Uuid) -> u64 {
        let version = self
            .channel_counter(channel_id)
            .fetch_add(1, Ordering::AcqRel)
            + 1;
        info!(%channel_id, version, "Bumped channel permission version");
        // No subscribers is fine.
        let _ = self.bumps.send(VersionBump {
            channel_id,
            version,
        });
        version
    }

    /// Bump several channels. Duplicates are bumped once.
    pub fn bump_many<I>(&self, channel_ids: I) -> HashMap<Uuid, u64>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let mut bumped = HashMap::new();
        for channel_id in channel_ids {
            bumped
                .entry(channel_id)
                .or_insert_with(|| self.bump(channel_id));
        }
        bumped
    }

    /// Invalidate everything cached for a channel.
    ///
    /// The version moves forward rather than back to 1, since entries cached
    /// under old versions may still exist.
    pub fn reset(&self, channel_id: Uuid) -> u64 {
        self.bump(channel_id)
    }

    /// Invalidate every tracked channel. Returns how many were bumped.
    ///
    /// Untracked channels have never been read, so nothing is cached for them.
    pub fn reset_all(&self) -> usize {
        let channels: Vec<Uuid> = self.versions.iter().map(|entry| *entry.key()).collect();
        let count = channels.len();
        self.bump_many(channels);
        count
    }

    /// Subscribe to version bumps.
    pub fn subscribe(&self) -> broadcast::Receiver<VersionBump> {
        self.bumps.subscribe()
    }

    // === Event intake ===

    /// A role binding of `channel_id` was created, updated or deleted.
    pub fn role_binding_changed(&self, channel_id: Uuid) -> u64 {
        self.bump(channel_id)
    }

    /// A permission template changed. Bumps every channel using it.
    #[tracing::instrument(skip(self, store))]
    pub fn template_changed<S>(
        &self,
        store: &S,
        template_id: Uuid,
    ) -> Result<HashMap<Uuid, u64>, PermissionError>
    where
        S: PermissionStore + ?Sized,
    {
        let channels = store
            .find_channels_using_template(template_id)
            .inspect_err(|e| warn!(%template_id, error = %e, "Template fan-out lookup failed"))?;
        Ok(self.bump_many(channels))
    }

    /// A user's roles in a group changed.
    ///
    /// Bumps every channel of the group that has any binding, which
    /// invalidates answers for all users of those channels, not only `user_id`.
    /// Public channels without bindings are not bumped. When a user leaves the
    /// group, their cached `VIEW_CHANNEL` answer there survives until
    /// [`PermissionResolver::clear_channel_cache`](super::PermissionResolver::clear_channel_cache)
    /// runs for that channel.
    #[tracing::instrument(skip(self, store))]
    pub fn member_roles_changed<S>(
        &self,
        store: &S,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<HashMap<Uuid, u64>, PermissionError>
    where
        S: PermissionStore + ?Sized,
    {
        let channels = store
            .find_channels_with_bindings_in_group(group_id)
            .inspect_err(|e| warn!(%group_id, error = %e, "Group fan-out lookup failed"))?;
        Ok(self.bump_many(channels))
    }

    /// A member override in `channel_id` was created, updated or deleted.
    pub fn member_override_changed(&self, channel_id: Uuid, user_id: Uuid) -> u64 {
        let version = self.bump(channel_id);
        debug!(%channel_id, %user_id, version, "Member override changed");
        version
    }

    /// Dispatch an event to the matching intake method.
    pub fn handle<S>(
        &self,
        store: &S,
        event: PermissionEvent,
    ) -> Result<HashMap<Uuid, u64>, PermissionError>
    where
        S: PermissionStore + ?Sized,
    {
        match event {
            PermissionEvent::RoleBindingChanged { channel_id } => {
                Ok(HashMap::from([(channel_id, self.role_binding_changed(channel_id))]))
            }
            PermissionEvent::TemplateChanged { template_id } => {
                self.template_changed(store, template_id)
            }
            PermissionEvent::MemberRolesChanged { group_id, user_id } => {
                self.member_roles_changed(store, group_id, user_id)
            }
            PermissionEvent::MemberOverrideChanged {
                channel_id,
                user_id,
            } => Ok(HashMap::from([(
                channel_id,
                self.member_override_changed(channel_id, user_id),
            )])),
        }
    }
}
