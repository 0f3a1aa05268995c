//! Reusable test helpers for permission integration tests.
//!
//! Provides `TestWorld`: an in-memory store plus a resolver over it, with
//! mutation helpers that pair every write with its invalidation event the way
//! the real write path does.
#![allow(dead_code)]

use std::sync::Arc;

use campus_server::permissions::{
    ChannelInfo, ChannelPermissions, MemberOverride, MemoryPermissionStore, PermissionConfig,
    PermissionEvent, PermissionResolver, PermissionTemplate, RoleBinding,
};
use uuid::Uuid;

pub struct TestWorld {
    pub store: Arc<MemoryPermissionStore>,
    pub resolver: PermissionResolver<Arc<MemoryPermissionStore>>,
    pub group_id: Uuid,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(&PermissionConfig::default())
    }

    pub fn with_config(config: &PermissionConfig) -> Self {
        let store = Arc::new(MemoryPermissionStore::new());
        Self {
            resolver: PermissionResolver::new(Arc::clone(&store), config),
            store,
            group_id: Uuid::new_v4(),
        }
    }

    pub fn create_channel(&self, is_public: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.store.insert_channel(ChannelInfo {
            id,
            group_id: self.group_id,
            is_public,
        });
        id
    }

    /// Create a group member holding `role_ids`.
    pub fn create_member(&self, role_ids: &[Uuid]) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store
            .set_membership(self.group_id, user_id, role_ids.to_vec());
        user_id
    }

    /// Create a user who exists but is not in the group.
    pub fn create_outsider(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store.insert_user(user_id);
        user_id
    }

    /// Replace a member's roles and fire the membership event.
    pub fn set_roles(&self, user_id: Uuid, role_ids: &[Uuid]) {
        self.store
            .set_membership(self.group_id, user_id, role_ids.to_vec());
        self.resolver
            .handle_event(PermissionEvent::MemberRolesChanged {
                group_id: self.group_id,
                user_id,
            })
            .expect("membership event failed");
    }

    /// Bind a role to a channel and fire the binding event.
    pub fn bind(
        &self,
        channel_id: Uuid,
        role_id: Uuid,
        allow: ChannelPermissions,
        deny: ChannelPermissions,
    ) -> RoleBinding {
        let binding = RoleBinding {
            id: Uuid::new_v4(),
            channel_id,
            role_id,
            template_id: None,
            template_permissions: ChannelPermissions::empty(),
            allow_permissions: allow,
            deny_permissions: deny,
        };
        self.save_binding(binding.clone());
        binding
    }

    /// Insert or update a binding and fire the binding event.
    pub fn save_binding(&self, binding: RoleBinding) {
        let channel_id = binding.channel_id;
        self.store
            .upsert_binding(binding)
            .expect("binding rejected");
        self.resolver
            .handle_event(PermissionEvent::RoleBindingChanged { channel_id })
            .expect("binding event failed");
    }

    /// Set a member override and fire the override event.
    pub fn set_override(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        allow: ChannelPermissions,
        deny: ChannelPermissions,
    ) {
        self.store
            .set_override(MemberOverride {
                channel_id,
                user_id,
                allow_permissions: allow,
                deny_permissions: deny,
            })
            .expect("override rejected");
        self.resolver
            .handle_event(PermissionEvent::MemberOverrideChanged {
                channel_id,
                user_id,
            })
            .expect("override event failed");
    }

    /// Insert or update a template and fire the template event.
    pub fn save_template(&self, template_id: Uuid, permissions: ChannelPermissions) {
        self.store
            .upsert_template(PermissionTemplate {
                id: template_id,
                name: format!("template-{template_id}"),
                permissions,
            })
            .expect("template rejected");
        self.resolver
            .handle_event(PermissionEvent::TemplateChanged { template_id })
            .expect("template event failed");
    }

    pub fn has(&self, channel_id: Uuid, user_id: Uuid, capability: ChannelPermissions) -> bool {
        self.resolver
            .has_capability(channel_id, user_id, capability)
            .expect("capability check failed")
    }

    pub fn effective(&self, channel_id: Uuid, user_id: Uuid) -> ChannelPermissions {
        self.resolver
            .effective_capabilities(channel_id, user_id)
            .expect("effective capabilities failed")
    }
}
