//! Write-time validation for bindings and overrides.
//!
//! The resolver trusts stored data. Whatever writes bindings or overrides
//! must run these checks first and reject the write on error.

use super::capability::ChannelPermissions;
use super::models::{MemberOverride, RoleBinding};
use super::resolver::PermissionError;

/// Reject a grant/deny pair that contradicts itself.
///
/// Rules:
/// 1. Nothing may be both granted and denied.
/// 2. A coarse capability may not be granted while a capability it implies
///    is denied (`POST_UPDATE_ANY` allowed with `POST_UPDATE_OWN` denied).
pub fn check_grant_deny(
    granted: ChannelPermissions,
    denied: ChannelPermissions,
) -> Result<(), PermissionError> {
    let overlap = granted & denied;
    if !overlap.is_empty() {
        return Err(PermissionError::Conflict(overlap));
    }

    for (coarse, implied) in granted.implied_pairs() {
        let contradicted = implied & denied;
        if !contradicted.is_empty() {
            return Err(PermissionError::InheritanceInconsistency {
                granted: coarse,
                denied: contradicted,
            });
        }
    }

    Ok(())
}

/// Validate a role binding before it is stored.
pub fn validate_binding(binding: &RoleBinding) -> Result<(), PermissionError> {
    check_grant_deny(binding.granted(), binding.deny_permissions)
}

/// Validate a member override before it is stored.
pub fn validate_override(member_override: &MemberOverride) -> Result<(), PermissionError> {
    check_grant_deny(
        member_override.allow_permissions,
        member_override.deny_permissions,
    )
}

/// Require that a grant set already contains everything it implies.
///
/// Stricter than [`check_grant_deny`]: used where grants are stored
/// pre-expanded, such as permission templates.
pub fn check_inheritance_closed(granted: ChannelPermissions) -> Result<(), PermissionError> {
    let missing = granted.implies() - granted;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PermissionError::InheritanceNotClosed { granted, missing })
    }
}
