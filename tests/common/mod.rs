#![allow(dead_code)]

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

use soluly::authz::{PermissionMatrix, ProjectScope, SessionConfig, SqliteRoleStore};
use soluly::jwt::JwtConfig;
use soluly::models::role::{NewRole, Role};
use soluly::utils::{timestamp, utc_now};
use soluly::AppState;

pub const JWT_SECRET: &str = "test-secret";

/// A migrated SQLite file that lives as long as this value.
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn setup_db() -> Result<TestDb> {
    let dir = tempfile::tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok(TestDb { pool, _dir: dir })
}

pub fn test_state(pool: &SqlitePool) -> AppState {
    AppState::new(pool.clone(), JwtConfig::new(JWT_SECRET, 1), SessionConfig::default())
}

pub fn token_for(auth_user_id: Uuid) -> Result<String> {
    Ok(JwtConfig::new(JWT_SECRET, 1).encode(auth_user_id)?)
}

pub async fn seed_org(pool: &SqlitePool, slug: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO organizations (id, name, slug) VALUES (?, ?, ?)")
        .bind(id.to_string())
        .bind(slug.to_uppercase())
        .bind(slug)
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn seed_role(
    pool: &SqlitePool,
    organization_id: Uuid,
    name: &str,
    permissions: PermissionMatrix,
    scope: ProjectScope,
) -> Result<Role> {
    let store = SqliteRoleStore::new(pool.clone());
    Ok(store.create(organization_id, NewRole::new(name, permissions, scope)).await?)
}

/// Inserts a member and returns `(member_id, auth_user_id)`.
pub async fn seed_member(pool: &SqlitePool, organization_id: Uuid, role_id: Option<Uuid>) -> Result<(Uuid, Uuid)> {
    let member_id = Uuid::new_v4();
    let auth_user_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO members (id, organization_id, auth_user_id, role_id, display_name, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(member_id.to_string())
    .bind(organization_id.to_string())
    .bind(auth_user_id.to_string())
    .bind(role_id.map(|id| id.to_string()))
    .bind("Test Member")
    .bind(timestamp(utc_now()))
    .execute(pool)
    .await?;
    Ok((member_id, auth_user_id))
}

pub async fn seed_ticket(
    pool: &SqlitePool,
    organization_id: Uuid,
    project_id: Option<Uuid>,
    assignee_id: Option<Uuid>,
    created_by: Uuid,
    display_id: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO tickets (id, organization_id, project_id, display_id, title, status, assignee_id, created_by, created_at) VALUES (?, ?, ?, ?, ?, 'open', ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(organization_id.to_string())
    .bind(project_id.map(|p| p.to_string()))
    .bind(display_id)
    .bind(format!("Ticket {display_id}"))
    .bind(assignee_id.map(|a| a.to_string()))
    .bind(created_by.to_string())
    .bind(timestamp(utc_now()))
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn seed_form(
    pool: &SqlitePool,
    organization_id: Uuid,
    created_by: Uuid,
    name: &str,
    project_ids: &[Uuid],
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO forms (id, organization_id, name, created_by, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .bind(name)
        .bind(created_by.to_string())
        .bind(timestamp(utc_now()))
        .execute(pool)
        .await?;

    for project_id in project_ids {
        sqlx::query("INSERT INTO form_projects (form_id, project_id) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(project_id.to_string())
            .execute(pool)
            .await?;
    }
    Ok(id)
}

/// Sends one request and returns the status with the JSON body (`Null` when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

pub fn ids_of(body: &Value) -> Vec<String> {
    body.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(Value::as_str).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
