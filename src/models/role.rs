use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::templates::RoleTemplate;
use crate::authz::{PermissionMatrix, ProjectScope, ValidationError};
use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[schema(value_type = Object)]
    pub permissions: PermissionMatrix,
    /// `null` grants every project, `[]` grants none.
    #[schema(value_type = Option<Vec<String>>)]
    pub project_scope: ProjectScope,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// An unsaved role, mostly useful for building actors in tests.
    pub fn new(
        organization_id: Uuid,
        name: impl Into<String>,
        permissions: PermissionMatrix,
        project_scope: ProjectScope,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            description: None,
            permissions,
            project_scope,
            is_system: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// A role row as read from the backend, before strict validation.
#[derive(Debug, Clone, Serialize)]
pub struct DbRole {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub permissions: Value,
    pub project_scope: Value,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for DbRole {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

impl TryFrom<DbRole> for Role {
    type Error = ValidationError;

    fn try_from(db: DbRole) -> Result<Self, Self::Error> {
        Ok(Role {
            id: db.id,
            organization_id: db.organization_id,
            name: db.name,
            description: db.description,
            permissions: PermissionMatrix::from_json(&db.permissions)?,
            project_scope: ProjectScope::from_json(&db.project_scope)?,
            is_system: db.is_system,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

/// Input to the role store's `create`.
#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub permissions: PermissionMatrix,
    pub project_scope: ProjectScope,
    pub is_system: bool,
}

impl NewRole {
    pub fn new(name: impl Into<String>, permissions: PermissionMatrix, project_scope: ProjectScope) -> Self {
        Self {
            name: name.into(),
            description: None,
            permissions,
            project_scope,
            is_system: false,
        }
    }

    pub fn from_template(template: &RoleTemplate) -> Self {
        Self {
            name: template.name.to_string(),
            description: Some(template.description.to_string()),
            permissions: template.permissions.clone(),
            project_scope: template.project_scope.clone(),
            is_system: false,
        }
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }
}

/// Partial update for the role store's `update`. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct RolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<PermissionMatrix>,
    pub project_scope: Option<ProjectScope>,
}

// =============================================================================
// HTTP PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "Site Lead")]
    pub name: String,
    #[schema(example = "Leads on-site delivery for assigned projects")]
    pub description: Option<String>,
    /// Starting template key (`admin`, `manager`, `member`, `viewer`, `contractor`).
    #[schema(example = "member")]
    pub template: Option<String>,
    /// Full matrix; overrides the template's when both are given.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub permissions: Option<Value>,
    #[serde(default, deserialize_with = "crate::utils::deserialize_some")]
    #[schema(value_type = Option<Vec<String>>)]
    pub project_scope: Option<Value>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub permissions: Option<Value>,
    /// Present-and-null means "all projects"; absent leaves the scope alone.
    #[serde(default, deserialize_with = "crate::utils::deserialize_some")]
    #[schema(value_type = Option<Vec<String>>)]
    pub project_scope: Option<Value>,
}

impl RoleUpdateRequest {
    pub fn into_patch(self) -> Result<RolePatch, ValidationError> {
        Ok(RolePatch {
            name: self.name,
            description: self.description,
            permissions: self.permissions.as_ref().map(PermissionMatrix::from_json).transpose()?,
            project_scope: self.project_scope.as_ref().map(ProjectScope::from_json).transpose()?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleTemplateView {
    pub key: String,
    pub name: String,
    pub description: String,
    #[schema(value_type = Object)]
    pub permissions: PermissionMatrix,
    #[schema(value_type = Option<Vec<String>>)]
    pub project_scope: ProjectScope,
}

impl From<&RoleTemplate> for RoleTemplateView {
    fn from(t: &RoleTemplate) -> Self {
        Self {
            key: t.key.to_string(),
            name: t.name.to_string(),
            description: t.description.to_string(),
            permissions: t.permissions.clone(),
            project_scope: t.project_scope.clone(),
        }
    }
}
