//! Channel permission resolution.
//!
//! Decides what a user may do in a channel:
//! - Role bindings: per-role grants with binding-scoped denies
//! - Member overrides: per-user exceptions applied after roles
//! - Inheritance: coarse capabilities imply finer ones
//! - Public fallback: members without a bound role may view public channels
//!
//! Answers are cached under a per-channel version that the invalidation
//! coordinator bumps on every relevant mutation.

pub mod cache;
pub mod capability;
pub mod config;
pub mod invalidation;
pub mod models;
pub mod resolver;
pub mod store;
pub mod validation;

pub use cache::{CacheKey, CacheStats, PermissionCache};
pub use capability::ChannelPermissions;
pub use config::PermissionConfig;
pub use invalidation::{InvalidationCoordinator, PermissionEvent, VersionBump, INITIAL_VERSION};
pub use models::*;
pub use resolver::{
    aggregate_bindings, apply_member_override, compute_channel_permissions, permits,
    PermissionError, PermissionResolver,
};
pub use store::{Entity, MemoryPermissionStore, PermissionStore, StoreError, StoreSnapshot};
pub use validation::{
    check_grant_deny, check_inheritance_closed, validate_binding, validate_override,
};
