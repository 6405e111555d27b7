use std::sync::Arc;

use uuid::Uuid;

use super::matrix::{Action, PermissionValue, Resource};
use super::scope::ProjectScope;
use super::{MemberId, OrganizationId, RoleId};
use crate::models::role::Role;

/// A resolved member together with a snapshot of their role.
///
/// An actor without a role holds the zero-permission matrix.
#[derive(Debug, Clone)]
pub struct Actor {
    pub member_id: MemberId,
    pub organization_id: OrganizationId,
    /// The member's `role_id`, kept even when the role could not be loaded.
    pub assigned_role_id: Option<RoleId>,
    pub role: Option<Arc<Role>>,
}

impl Actor {
    pub fn new(member_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            member_id,
            organization_id,
            assigned_role_id: None,
            role: None,
        }
    }

    pub fn with_role(self, role: Role) -> Self {
        self.with_shared_role(Some(Arc::new(role)))
    }

    pub fn with_shared_role(mut self, role: Option<Arc<Role>>) -> Self {
        if let Some(role) = &role {
            self.assigned_role_id = Some(role.id);
        }
        self.role = role;
        self
    }

    pub fn with_assigned_role(mut self, role_id: Option<RoleId>) -> Self {
        self.assigned_role_id = role_id;
        self
    }

    /// Whether a change to `role_id` affects this actor.
    pub fn holds_role(&self, role_id: RoleId) -> bool {
        self.assigned_role_id == Some(role_id) || self.role_id() == Some(role_id)
    }

    pub fn role_id(&self) -> Option<RoleId> {
        self.role.as_ref().map(|r| r.id)
    }

    pub fn permission(&self, resource: Resource, action: Action) -> PermissionValue {
        match &self.role {
            Some(role) => role.permissions.get(resource, action),
            None => PermissionValue::Denied,
        }
    }

    pub fn project_scope(&self) -> Option<&ProjectScope> {
        self.role.as_deref().map(|r| &r.project_scope)
    }
}
