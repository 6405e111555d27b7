use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::{MemberId, OwnershipField, ProjectId, ScopedRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Ticket {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// `None` for org-wide tickets.
    pub project_id: Option<Uuid>,
    pub display_id: String,
    pub title: String,
    pub status: String,
    pub assignee_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ScopedRecord for Ticket {
    fn owner(&self, field: OwnershipField) -> Option<MemberId> {
        match field {
            OwnershipField::AssigneeId => self.assignee_id,
            OwnershipField::CreatedBy => Some(self.created_by),
            _ => None,
        }
    }

    fn project_ids(&self) -> &[ProjectId] {
        self.project_id.as_slice()
    }
}
