//! Channel Permission Resolution Tests
//!
//! End-to-end checks of role aggregation, member overrides, the public
//! channel fallback and the view-gate through `PermissionResolver`.

mod helpers;

use campus_server::permissions::{
    ChannelPermissions, Entity, PermissionError, RoleBinding,
};
use helpers::TestWorld;
use uuid::Uuid;

// ============================================================================
// Role aggregation
// ============================================================================

#[test]
fn test_member_with_default_role_can_write() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let role = Uuid::new_v4();
    world.bind(
        channel,
        role,
        ChannelPermissions::MEMBER_DEFAULT,
        ChannelPermissions::empty(),
    );
    let user = world.create_member(&[role]);

    assert!(world.has(channel, user, ChannelPermissions::POST_WRITE));
    assert!(world.has(channel, user, ChannelPermissions::COMMENT_WRITE));
    assert!(!world.has(channel, user, ChannelPermissions::POST_DELETE_ANY));
    assert_eq!(
        world.effective(channel, user),
        ChannelPermissions::MEMBER_DEFAULT
    );
}

#[test]
fn test_grants_union_across_roles() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let reader = Uuid::new_v4();
    let pinner = Uuid::new_v4();
    world.bind(
        channel,
        reader,
        ChannelPermissions::VIEW_CHANNEL | ChannelPermissions::POST_READ,
        ChannelPermissions::empty(),
    );
    world.bind(
        channel,
        pinner,
        ChannelPermissions::POST_PIN,
        ChannelPermissions::empty(),
    );
    let user = world.create_member(&[reader, pinner]);

    assert_eq!(
        world.effective(channel, user),
        ChannelPermissions::VIEW_CHANNEL
            | ChannelPermissions::POST_READ
            | ChannelPermissions::POST_PIN
    );
}

#[test]
fn test_role_deny_does_not_cancel_other_roles() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let writer = Uuid::new_v4();
    let muted = Uuid::new_v4();
    world.bind(
        channel,
        writer,
        ChannelPermissions::MEMBER_DEFAULT,
        ChannelPermissions::empty(),
    );
    world.bind(
        channel,
        muted,
        ChannelPermissions::VIEW_CHANNEL | ChannelPermissions::POST_READ,
        ChannelPermissions::POST_WRITE,
    );

    let both = world.create_member(&[writer, muted]);
    let muted_only = world.create_member(&[muted]);

    assert!(world.has(channel, both, ChannelPermissions::POST_WRITE));
    assert!(!world.has(channel, muted_only, ChannelPermissions::POST_WRITE));
    assert!(world.has(channel, muted_only, ChannelPermissions::POST_READ));
}

#[test]
fn test_template_and_allow_combine() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let template_id = Uuid::new_v4();
    world.save_template(
        template_id,
        ChannelPermissions::VIEW_CHANNEL | ChannelPermissions::POST_READ,
    );

    let role = Uuid::new_v4();
    world.save_binding(RoleBinding {
        id: Uuid::new_v4(),
        channel_id: channel,
        role_id: role,
        template_id: Some(template_id),
        template_permissions: ChannelPermissions::empty(),
        allow_permissions: ChannelPermissions::COMMENT_READ,
        deny_permissions: ChannelPermissions::empty(),
    });
    let user = world.create_member(&[role]);

    assert_eq!(
        world.effective(channel, user),
        ChannelPermissions::VIEW_CHANNEL
            | ChannelPermissions::POST_READ
            | ChannelPermissions::COMMENT_READ
    );
}

#[test]
fn test_coarse_grant_expands_to_fine_capabilities() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let role = Uuid::new_v4();
    world.bind(
        channel,
        role,
        ChannelPermissions::VIEW_CHANNEL | ChannelPermissions::MANAGE_CHANNEL,
        ChannelPermissions::empty(),
    );
    let user = world.create_member(&[role]);

    for capability in [
        ChannelPermissions::POST_PIN,
        ChannelPermissions::POST_DELETE_ANY,
        ChannelPermissions::POST_DELETE_OWN,
        ChannelPermissions::COMMENT_DELETE_ANY,
        ChannelPermissions::COMMENT_DELETE_OWN,
    ] {
        assert!(
            world.has(channel, user, capability),
            "MANAGE_CHANNEL should imply {capability:?}"
        );
    }
    assert!(!world.has(channel, user, ChannelPermissions::POST_UPDATE_ANY));
}

// ============================================================================
// Member overrides
// ============================================================================

#[test]
fn test_override_deny_revokes_role_grant() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let role = Uuid::new_v4();
    world.bind(
        channel,
        role,
        ChannelPermissions::MEMBER_DEFAULT,
        ChannelPermissions::empty(),
    );
    let user = world.create_member(&[role]);
    world.set_override(
        channel,
        user,
        ChannelPermissions::empty(),
        ChannelPermissions::POST_WRITE,
    );

    assert!(!world.has(channel, user, ChannelPermissions::POST_WRITE));
    assert!(world.has(channel, user, ChannelPermissions::POST_READ));
}

#[test]
fn test_override_allow_adds_capability() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let role = Uuid::new_v4();
    world.bind(
        channel,
        role,
        ChannelPermissions::VIEW_CHANNEL | ChannelPermissions::POST_READ,
        ChannelPermissions::empty(),
    );
    let user = world.create_member(&[role]);
    world.set_override(
        channel,
        user,
        ChannelPermissions::POST_UPDATE_ANY,
        ChannelPermissions::empty(),
    );

    assert!(world.has(channel, user, ChannelPermissions::POST_UPDATE_ANY));
    assert!(world.has(channel, user, ChannelPermissions::POST_UPDATE_OWN));
}

#[test]
fn test_override_only_applies_to_its_user() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let role = Uuid::new_v4();
    world.bind(
        channel,
        role,
        ChannelPermissions::MEMBER_DEFAULT,
        ChannelPermissions::empty(),
    );
    let muted = world.create_member(&[role]);
    let other = world.create_member(&[role]);
    world.set_override(
        channel,
        muted,
        ChannelPermissions::empty(),
        ChannelPermissions::POST_WRITE,
    );

    assert!(!world.has(channel, muted, ChannelPermissions::POST_WRITE));
    assert!(world.has(channel, other, ChannelPermissions::POST_WRITE));
}

#[test]
fn test_override_ignored_without_bound_role() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let user = world.create_member(&[Uuid::new_v4()]);
    world.set_override(
        channel,
        user,
        ChannelPermissions::MEMBER_DEFAULT,
        ChannelPermissions::empty(),
    );

    assert!(world.effective(channel, user).is_empty());
}

#[test]
fn test_self_contradicting_override_is_rejected() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let user = world.create_member(&[]);

    let result = world
        .store
        .set_override(campus_server::permissions::MemberOverride {
            channel_id: channel,
            user_id: user,
            allow_permissions: ChannelPermissions::POST_DELETE_ANY,
            deny_permissions: ChannelPermissions::POST_DELETE_OWN,
        });

    assert!(matches!(
        result,
        Err(PermissionError::InheritanceInconsistency { .. })
    ));
}

// ============================================================================
// Public fallback and view-gate
// ============================================================================

#[test]
fn test_public_channel_without_binding_grants_view_only() {
    let world = TestWorld::new();
    let channel = world.create_channel(true);
    let user = world.create_member(&[Uuid::new_v4()]);

    assert_eq!(
        world.effective(channel, user),
        ChannelPermissions::VIEW_CHANNEL
    );
    assert!(world.has(channel, user, ChannelPermissions::VIEW_CHANNEL));
    assert!(!world.has(channel, user, ChannelPermissions::POST_READ));
}

#[test]
fn test_private_channel_without_binding_grants_nothing() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let user = world.create_member(&[Uuid::new_v4()]);

    assert!(world.effective(channel, user).is_empty());
    assert!(!world.has(channel, user, ChannelPermissions::VIEW_CHANNEL));
}

#[test]
fn test_non_member_gets_nothing_even_in_public_channel() {
    let world = TestWorld::new();
    let channel = world.create_channel(true);
    let outsider = world.create_outsider();

    assert!(world.effective(channel, outsider).is_empty());
    assert!(!world.has(channel, outsider, ChannelPermissions::VIEW_CHANNEL));
}

#[test]
fn test_capability_without_view_is_denied() {
    let world = TestWorld::new();
    let channel = world.create_channel(false);
    let role = Uuid::new_v4();
    world.bind(
        channel,
        role,
        ChannelPermissions::POST_READ | ChannelPermissions::POST_WRITE,
        ChannelPermissions::empty(),
    );
    let user = world.create_member(&[role]);

    // Effective capabilities are reported as computed.
    assert_eq!(
        world.effective(channel, user),
        ChannelPermissions::POST_READ | ChannelPermissions::POST_WRITE
    );
    // Checks still require the view-gate.
    assert!(!world.has(channel, user, ChannelPermissions::POST_READ));
    assert!(!world.has(channel, user, ChannelPermissions::POST_WRITE));
}

#[test]
fn test_override_denying_view_blocks_everything() {
    let world = TestWorld::new();
    let channel = world.create_channel(true);
    let role = Uuid::new_v4();
    world.bind(
        channel,
        role,
        ChannelPermissions::MODERATOR_DEFAULT,
        ChannelPermissions::empty(),
    );
    let user = world.create_member(&[role]);
    world.set_override(
        channel,
        user,
        ChannelPermissions::empty(),
        ChannelPermissions::VIEW_CHANNEL,
    );

    for (_, capability) in ChannelPermissions::MODERATOR_DEFAULT.iter_names() {
        assert!(!world.has(channel, user, capability));
    }
}

// ============================================================================
// Errors and helpers
// ============================================================================

#[test]
fn test_unknown_channel_is_not_found() {
    let world = TestWorld::new();
    let user = world.create_member(&[]);
    let missing = Uuid::new_v4();

    let result =
        world
            .resolver
            .has_capability(missing, user, ChannelPermissions::VIEW_CHANNEL);
    assert_eq!(
        result,
        Err(PermissionError::NotFound {
            entity: Entity::Channel,
            id: missing,
        })
    );
}

#[test]
fn test_unknown_user_is_not_found() {
    let world = TestWorld::new();
    let channel = world.create_channel(true);
    let missing = Uuid::new_v4();

    let result = world.resolver.effective_capabilities(channel, missing);
    assert_eq!(
        result,
        Err(PermissionError::NotFound {
            entity: Entity::User,
            id: missing,
        })
    );
}

#[test]
fn test_require_capability_reports_missing_permission() {
    let world = TestWorld::new();
    let channel = world.create_channel(true);
    let user = world.create_member(&[]);

    assert!(world
        .resolver
        .require_capability(channel, user, ChannelPermissions::VIEW_CHANNEL)
        .is_ok());
    assert_eq!(
        world
            .resolver
            .require_capability(channel, user, ChannelPermissions::POST_WRITE),
        Err(PermissionError::MissingPermission(
            ChannelPermissions::POST_WRITE
        ))
    );
}

#[test]
fn test_filter_visible_channels() {
    let world = TestWorld::new();
    let role = Uuid::new_v4();
    let public = world.create_channel(true);
    let bound_private = world.create_channel(false);
    let hidden = world.create_channel(false);
    world.bind(
        bound_private,
        role,
        ChannelPermissions::VIEW_CHANNEL,
        ChannelPermissions::empty(),
    );
    let user = world.create_member(&[role]);

    let visible = world
        .resolver
        .filter_visible_channels(user, &[public, bound_private, hidden])
        .unwrap();
    assert_eq!(visible, vec![public, bound_private]);
}
