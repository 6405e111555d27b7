use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use soluly::authz::{
    Action, PermissionMatrix, PermissionValue, ProjectScope, Resolution, Resource, SessionConfig, SessionContext,
    SessionState, SqliteDirectory, SqliteRoleStore,
};
use soluly::models::role::RolePatch;

mod common;

fn context(pool: &sqlx::SqlitePool) -> Arc<SessionContext> {
    Arc::new(SessionContext::new(
        Arc::new(SqliteDirectory::new(pool.clone())),
        SessionConfig::default(),
    ))
}

fn viewer() -> PermissionMatrix {
    PermissionMatrix::default_matrix()
        .with(Resource::Tickets, Action::View, PermissionValue::Allowed)
        .with(Resource::Dashboard, Action::View, PermissionValue::Allowed)
}

#[tokio::test]
async fn resolves_member_organization_and_role() -> Result<()> {
    let db = common::setup_db().await?;
    let org = common::seed_org(&db.pool, "acme").await?;
    let project = Uuid::new_v4();
    let role = common::seed_role(&db.pool, org, "Viewer", viewer(), ProjectScope::only([project])).await?;
    let (member_id, user) = common::seed_member(&db.pool, org, Some(role.id)).await?;

    let sessions = context(&db.pool);
    let state = sessions.resolve(user).await;

    let actor = state.actor().expect("member resolves to an actor");
    assert_eq!(actor.member_id, member_id);
    assert_eq!(actor.organization_id, org);
    assert!(state.has_permission(Resource::Tickets, Action::View));
    assert!(!state.has_permission(Resource::Tickets, Action::Edit));
    assert!(!state.has_full_project_access());
    assert!(state.has_project_access(&project));
    assert_eq!(state.allowed_project_ids(), Some(vec![project]));

    Ok(())
}

#[tokio::test]
async fn unknown_user_is_anonymous() -> Result<()> {
    let db = common::setup_db().await?;
    let sessions = context(&db.pool);

    let state = sessions.resolve(Uuid::new_v4()).await;
    assert!(matches!(state, SessionState::Resolved(Resolution::Anonymous)));
    assert!(!state.has_permission(Resource::Dashboard, Action::View));

    Ok(())
}

#[tokio::test]
async fn deleted_role_resolves_to_zero_permissions() -> Result<()> {
    let db = common::setup_db().await?;
    let org = common::seed_org(&db.pool, "acme").await?;
    let sessions = context(&db.pool);
    let store = SqliteRoleStore::new(db.pool.clone()).with_invalidation(sessions.clone());

    let role = common::seed_role(&db.pool, org, "Viewer", viewer(), ProjectScope::All).await?;
    let (_, user) = common::seed_member(&db.pool, org, Some(role.id)).await?;

    assert!(sessions.resolve(user).await.has_permission(Resource::Tickets, Action::View));

    store.delete(org, role.id).await?;
    assert!(matches!(sessions.state(user), SessionState::Uninitialized));

    let state = sessions.resolve(user).await;
    let actor = state.actor().expect("member still resolves");
    assert!(actor.role.is_none());
    assert!(!state.has_permission(Resource::Tickets, Action::View));
    assert_eq!(state.allowed_project_ids(), Some(Vec::new()));

    Ok(())
}

#[tokio::test]
async fn role_edit_is_visible_on_next_resolution() -> Result<()> {
    let db = common::setup_db().await?;
    let org = common::seed_org(&db.pool, "acme").await?;
    let sessions = context(&db.pool);
    let store = SqliteRoleStore::new(db.pool.clone()).with_invalidation(sessions.clone());

    let role = common::seed_role(&db.pool, org, "Viewer", viewer(), ProjectScope::All).await?;
    let (_, user) = common::seed_member(&db.pool, org, Some(role.id)).await?;
    let (_, bystander) = common::seed_member(&db.pool, org, None).await?;

    sessions.resolve(user).await;
    sessions.resolve(bystander).await;

    let patch = RolePatch {
        permissions: Some(viewer().with(Resource::Tickets, Action::Delete, PermissionValue::Allowed)),
        ..Default::default()
    };
    store.update(org, role.id, patch).await?;

    assert!(sessions.state(bystander).is_resolved(), "other sessions keep their snapshot");
    let state = sessions.resolve(user).await;
    assert!(state.has_permission(Resource::Tickets, Action::Delete));

    Ok(())
}

#[tokio::test]
async fn role_of_another_organization_is_not_honoured() -> Result<()> {
    let db = common::setup_db().await?;
    let acme = common::seed_org(&db.pool, "acme").await?;
    let globex = common::seed_org(&db.pool, "globex").await?;
    let foreign = common::seed_role(&db.pool, globex, "Admin", PermissionMatrix::full(), ProjectScope::All).await?;
    let (_, user) = common::seed_member(&db.pool, acme, Some(foreign.id)).await?;

    let state = context(&db.pool).resolve(user).await;
    assert!(state.actor().is_some_and(|a| a.role.is_none()));
    assert!(!state.has_permission(Resource::Settings, Action::ManageRoles));

    Ok(())
}

#[tokio::test]
async fn malformed_role_row_fails_closed() -> Result<()> {
    let db = common::setup_db().await?;
    let org = common::seed_org(&db.pool, "acme").await?;
    let role = common::seed_role(&db.pool, org, "Viewer", viewer(), ProjectScope::All).await?;
    let (_, user) = common::seed_member(&db.pool, org, Some(role.id)).await?;

    sqlx::query("UPDATE roles SET permissions = ? WHERE id = ?")
        .bind(r#"{"tickets": {"view": true}}"#)
        .bind(role.id.to_string())
        .execute(&db.pool)
        .await?;

    let sessions = context(&db.pool);
    let store = SqliteRoleStore::new(db.pool.clone()).with_invalidation(sessions.clone());
    let state = sessions.resolve(user).await;
    assert!(state.actor().is_some_and(|a| a.role.is_none()));
    assert!(!state.has_permission(Resource::Tickets, Action::View));

    let repair = RolePatch {
        permissions: Some(viewer()),
        ..Default::default()
    };
    store.update(org, role.id, repair).await?;
    assert!(matches!(sessions.state(user), SessionState::Uninitialized));
    assert!(sessions.resolve(user).await.has_permission(Resource::Tickets, Action::View));

    Ok(())
}

#[tokio::test]
async fn refresh_picks_up_role_reassignment() -> Result<()> {
    let db = common::setup_db().await?;
    let org = common::seed_org(&db.pool, "acme").await?;
    let viewer_role = common::seed_role(&db.pool, org, "Viewer", viewer(), ProjectScope::All).await?;
    let admin = common::seed_role(&db.pool, org, "Admin", PermissionMatrix::full(), ProjectScope::All).await?;
    let (member_id, user) = common::seed_member(&db.pool, org, Some(viewer_role.id)).await?;
    let sessions = context(&db.pool);

    assert!(!sessions.resolve(user).await.has_permission(Resource::Settings, Action::View));

    sqlx::query("UPDATE members SET role_id = ? WHERE id = ?")
        .bind(admin.id.to_string())
        .bind(member_id.to_string())
        .execute(&db.pool)
        .await?;

    // The cached snapshot is served until an explicit refresh.
    assert!(!sessions.resolve(user).await.has_permission(Resource::Settings, Action::View));
    sessions.refresh_user_data(user).await?;
    assert!(sessions.state(user).has_permission(Resource::Settings, Action::View));

    Ok(())
}
