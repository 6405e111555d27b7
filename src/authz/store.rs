//! Role store: the only writer of role and permission data.
//!
//! Every query is scoped by `organization_id`. Successful updates and
//! deletes notify the registered [`RoleInvalidation`] observers so that
//! cached actor snapshots holding the role are dropped.

use std::sync::Arc;

use sqlx::SqlitePool;

use super::errors::{RoleStoreError, RoleStoreResult, ValidationError};
use super::matrix::{validate, PermissionMatrix};
use super::scope::ProjectScope;
use super::templates;
use super::{OrganizationId, RoleId};
use crate::db::row_parsers::db_role_from_row;
use crate::models::role::{DbRole, NewRole, Role, RolePatch};
use crate::utils::{normalize_name, timestamp, utc_now};

const ROLE_COLUMNS: &str =
    "id, organization_id, name, description, permissions, project_scope, is_system, created_at, updated_at";

/// Receives the id of every role that was edited or deleted.
pub trait RoleInvalidation: Send + Sync {
    fn role_changed(&self, role_id: RoleId);
}

#[derive(Clone)]
pub struct SqliteRoleStore {
    pool: SqlitePool,
    observers: Vec<Arc<dyn RoleInvalidation>>,
}

impl SqliteRoleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            observers: Vec::new(),
        }
    }

    pub fn with_invalidation(mut self, observer: Arc<dyn RoleInvalidation>) -> Self {
        self.observers.push(observer);
        self
    }

    fn notify(&self, role_id: RoleId) {
        for observer in &self.observers {
            observer.role_changed(role_id);
        }
    }

    /// Lists roles ordered by name. Rows that fail validation are skipped.
    pub async fn list(&self, organization_id: OrganizationId) -> RoleStoreResult<Vec<Role>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE organization_id = ? ORDER BY name_key");
        let rows = sqlx::query(&sql)
            .bind(organization_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in &rows {
            let db_role = db_role_from_row(row).map_err(sqlx::Error::from)?;
            let role_id = db_role.id;
            match Role::try_from(db_role) {
                Ok(role) => roles.push(role),
                Err(err) => tracing::warn!(%role_id, error = %err, "skipping malformed role row"),
            }
        }
        Ok(roles)
    }

    pub async fn get(&self, organization_id: OrganizationId, role_id: RoleId) -> RoleStoreResult<Role> {
        let db_role = self.load(organization_id, role_id).await?;
        Ok(Role::try_from(db_role)?)
    }

    /// The stored row without matrix validation, so that broken rows can
    /// still be repaired or removed.
    async fn load(&self, organization_id: OrganizationId, role_id: RoleId) -> RoleStoreResult<DbRole> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE organization_id = ? AND id = ?");
        let row = sqlx::query(&sql)
            .bind(organization_id.to_string())
            .bind(role_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RoleStoreError::NotFound(role_id))?;

        Ok(db_role_from_row(&row).map_err(sqlx::Error::from)?)
    }

    pub async fn create(&self, organization_id: OrganizationId, input: NewRole) -> RoleStoreResult<Role> {
        let name = clean_name(&input.name)?;
        validate(&input.permissions)?;
        self.ensure_name_available(organization_id, &name, None).await?;

        let now = utc_now();
        let role = Role {
            id: uuid::Uuid::new_v4(),
            organization_id,
            name,
            description: input.description,
            permissions: input.permissions,
            project_scope: input.project_scope,
            is_system: input.is_system,
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            "INSERT INTO roles (id, organization_id, name, name_key, description, permissions, project_scope, is_system, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(role.id.to_string())
        .bind(organization_id.to_string())
        .bind(&role.name)
        .bind(normalize_name(&role.name))
        .bind(&role.description)
        .bind(role.permissions.to_json().to_string())
        .bind(scope_column(&role))
        .bind(role.is_system)
        .bind(timestamp(now))
        .bind(timestamp(now))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                return Err(RoleStoreError::DuplicateName(role.name));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(role_id = %role.id, %organization_id, name = %role.name, "role created");
        Ok(role)
    }

    pub async fn update(
        &self,
        organization_id: OrganizationId,
        role_id: RoleId,
        patch: RolePatch,
    ) -> RoleStoreResult<Role> {
        let stored = self.load(organization_id, role_id).await?;

        let mut name = stored.name.clone();
        if let Some(requested) = patch.name {
            let requested = clean_name(&requested)?;
            if requested != stored.name {
                if stored.is_system {
                    return Err(RoleStoreError::SystemRoleImmutableName);
                }
                self.ensure_name_available(organization_id, &requested, Some(role_id)).await?;
                name = requested;
            }
        }

        // A row whose stored matrix no longer validates only accepts a
        // complete replacement.
        let permissions = match patch.permissions {
            Some(permissions) => {
                validate(&permissions)?;
                permissions
            }
            None => PermissionMatrix::from_json(&stored.permissions)?,
        };
        let project_scope = match patch.project_scope {
            Some(scope) => scope,
            None => ProjectScope::from_json(&stored.project_scope)?,
        };

        let role = Role {
            id: stored.id,
            organization_id: stored.organization_id,
            name,
            description: patch.description.or(stored.description),
            permissions,
            project_scope,
            is_system: stored.is_system,
            created_at: stored.created_at,
            updated_at: utc_now(),
        };

        let result = sqlx::query(
            "UPDATE roles SET name = ?, name_key = ?, description = ?, permissions = ?, project_scope = ?, updated_at = ? WHERE id = ? AND organization_id = ?",
        )
        .bind(&role.name)
        .bind(normalize_name(&role.name))
        .bind(&role.description)
        .bind(role.permissions.to_json().to_string())
        .bind(scope_column(&role))
        .bind(timestamp(role.updated_at))
        .bind(role_id.to_string())
        .bind(organization_id.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => return Err(RoleStoreError::NotFound(role_id)),
            Ok(_) => {}
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                return Err(RoleStoreError::DuplicateName(role.name));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(%role_id, %organization_id, "role updated");
        self.notify(role_id);
        Ok(role)
    }

    /// Deletes a non-system role and returns the removed row, which may hold
    /// a matrix that no longer validates. Members still pointing at it are
    /// left alone and resolve to the zero-permission matrix.
    pub async fn delete(&self, organization_id: OrganizationId, role_id: RoleId) -> RoleStoreResult<DbRole> {
        let role = self.load(organization_id, role_id).await?;
        if role.is_system {
            return Err(RoleStoreError::SystemRoleUndeletable);
        }

        let done = sqlx::query("DELETE FROM roles WHERE id = ? AND organization_id = ? AND is_system = 0")
            .bind(role_id.to_string())
            .bind(organization_id.to_string())
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            return Err(RoleStoreError::NotFound(role_id));
        }

        tracing::info!(%role_id, %organization_id, "role deleted");
        self.notify(role_id);
        Ok(role)
    }

    /// Creates the built-in Admin role as a system role unless the
    /// organization already has a system role.
    pub async fn seed_system_roles(&self, organization_id: OrganizationId) -> RoleStoreResult<Vec<Role>> {
        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM roles WHERE organization_id = ? AND is_system = 1")
                .bind(organization_id.to_string())
                .fetch_one(&self.pool)
                .await?;

        if existing > 0 {
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        if let Some(admin) = templates::template("admin") {
            let role = self
                .create(organization_id, NewRole::from_template(admin).system())
                .await?;
            created.push(role);
        }
        Ok(created)
    }

    async fn ensure_name_available(
        &self,
        organization_id: OrganizationId,
        name: &str,
        except: Option<RoleId>,
    ) -> RoleStoreResult<()> {
        let except = except.map(|id| id.to_string()).unwrap_or_default();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM roles WHERE organization_id = ? AND name_key = ? AND id != ?",
        )
        .bind(organization_id.to_string())
        .bind(normalize_name(name))
        .bind(except)
        .fetch_one(&self.pool)
        .await?;

        if count > 0 {
            return Err(RoleStoreError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

fn clean_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_string())
}

fn scope_column(role: &Role) -> Option<String> {
    role.project_scope
        .allowed_ids()
        .map(|_| role.project_scope.to_json().to_string())
}
