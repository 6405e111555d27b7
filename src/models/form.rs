use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{MemberId, OwnershipField, ProjectId, ScopedRecord};

/// A custom form. It may be linked to any number of projects, or none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Form {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub project_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ScopedRecord for Form {
    fn owner(&self, field: OwnershipField) -> Option<MemberId> {
        match field {
            OwnershipField::CreatedBy => Some(self.created_by),
            _ => None,
        }
    }

    fn project_ids(&self) -> &[ProjectId] {
        &self.project_ids
    }
}
