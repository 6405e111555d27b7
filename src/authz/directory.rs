use async_trait::async_trait;
use sqlx::SqlitePool;

use super::errors::DirectoryError;
use super::{AuthUserId, OrganizationId, RoleId};
use crate::db::row_parsers::{db_role_from_row, member_from_row, organization_from_row};
use crate::models::member::{Member, Organization};
use crate::models::role::DbRole;

/// Read side of the backend the session context resolves actors from.
///
/// `Ok(None)` means the row does not exist; errors mean the backend could
/// not answer.
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    async fn fetch_member(&self, auth_user_id: AuthUserId) -> Result<Option<Member>, DirectoryError>;

    async fn fetch_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, DirectoryError>;

    async fn fetch_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
    ) -> Result<Option<DbRole>, DirectoryError>;
}

#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryBackend for SqliteDirectory {
    async fn fetch_member(&self, auth_user_id: AuthUserId) -> Result<Option<Member>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, auth_user_id, role_id, display_name, created_at FROM members WHERE auth_user_id = ? ORDER BY created_at LIMIT 1",
        )
        .bind(auth_user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| member_from_row(&r).map_err(sqlx::Error::from))
            .transpose()
            .map_err(DirectoryError::from)
    }

    async fn fetch_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, DirectoryError> {
        let row = sqlx::query("SELECT id, name, slug FROM organizations WHERE id = ?")
            .bind(organization_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| organization_from_row(&r).map_err(sqlx::Error::from))
            .transpose()
            .map_err(DirectoryError::from)
    }

    async fn fetch_role(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
    ) -> Result<Option<DbRole>, DirectoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, name, description, permissions, project_scope, is_system, created_at, updated_at FROM roles WHERE organization_id = ? AND id = ?",
        )
        .bind(organization_id.to_string())
        .bind(role_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // An undecodable row is treated like a missing role: fail closed.
        match db_role_from_row(&row) {
            Ok(role) => Ok(Some(role)),
            Err(err) => {
                tracing::warn!(%role_id, error = %err, "role row could not be decoded");
                Ok(None)
            }
        }
    }
}
