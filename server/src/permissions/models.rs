//! Data models for channel permission resolution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::capability::ChannelPermissions;

/// What the resolver needs to know about a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: Uuid,
    /// The student group that owns the channel.
    pub group_id: Uuid,
    /// Public channels are visible to group members without a bound role.
    pub is_public: bool,
}

/// A group role bound to a channel, with the capabilities it confers there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub role_id: Uuid,
    /// Permission template the binding was created from, if any.
    #[serde(default)]
    pub template_id: Option<Uuid>,
    /// Capabilities copied from the template.
    #[serde(default)]
    pub template_permissions: ChannelPermissions,
    #[serde(default)]
    pub allow_permissions: ChannelPermissions,
    #[serde(default)]
    pub deny_permissions: ChannelPermissions,
}

impl RoleBinding {
    /// Everything the binding grants before its own deny is applied.
    #[must_use]
    pub fn granted(&self) -> ChannelPermissions {
        self.template_permissions | self.allow_permissions
    }

    /// What this binding adds to the aggregate.
    ///
    /// The deny only cancels this binding's own grants.
    #[must_use]
    pub fn contribution(&self) -> ChannelPermissions {
        self.granted() & !self.deny_permissions
    }
}

/// Per-user, per-channel exception layered on top of role grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberOverride {
    pub channel_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub allow_permissions: ChannelPermissions,
    #[serde(default)]
    pub deny_permissions: ChannelPermissions,
}

impl MemberOverride {
    /// Apply the override to an aggregated mask.
    #[must_use]
    pub fn apply(&self, aggregate: ChannelPermissions) -> ChannelPermissions {
        (aggregate | self.allow_permissions) & !self.deny_permissions
    }
}

/// A permission template shared by many bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTemplate {
    pub id: Uuid,
    pub name: String,
    pub permissions: ChannelPermissions,
}

/// Membership of a user in a group, with the group roles they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub role_ids: Vec<Uuid>,
}
