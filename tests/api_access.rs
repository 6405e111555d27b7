use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use soluly::authz::{
    template, Action, PermissionMatrix, PermissionValue, ProjectScope, Resource, SessionContext, SessionState,
};
use soluly::jwt::JwtConfig;
use soluly::router;

mod common;

struct Fixture {
    db: common::TestDb,
    app: axum::Router,
    sessions: Arc<SessionContext>,
    org: Uuid,
    admin_member: Uuid,
    admin_token: String,
    support_member: Uuid,
    support_token: String,
    support_role: Uuid,
    in_scope: Uuid,
    out_of_scope: Uuid,
}

/// Support sees tickets assigned to them, limited to one project.
fn support_matrix() -> PermissionMatrix {
    PermissionMatrix::default_matrix()
        .with(Resource::Tickets, Action::View, PermissionValue::OwnOnly)
        .with(Resource::Forms, Action::View, PermissionValue::Allowed)
        .with(Resource::Settings, Action::View, PermissionValue::Allowed)
}

async fn fixture() -> Result<Fixture> {
    let db = common::setup_db().await?;
    let org = common::seed_org(&db.pool, "acme").await?;
    let in_scope = Uuid::new_v4();
    let out_of_scope = Uuid::new_v4();

    let admin = common::seed_role(&db.pool, org, "Owner", PermissionMatrix::full(), ProjectScope::All).await?;
    let support =
        common::seed_role(&db.pool, org, "Support", support_matrix(), ProjectScope::only([in_scope])).await?;

    let (admin_member, admin_user) = common::seed_member(&db.pool, org, Some(admin.id)).await?;
    let (support_member, support_user) = common::seed_member(&db.pool, org, Some(support.id)).await?;

    let state = common::test_state(&db.pool);
    let sessions = state.sessions.clone();
    let app = router(state);
    Ok(Fixture {
        app,
        sessions,
        org,
        admin_member,
        admin_token: common::token_for(admin_user)?,
        support_member,
        support_token: common::token_for(support_user)?,
        support_role: support.id,
        in_scope,
        out_of_scope,
        db,
    })
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() -> Result<()> {
    let fx = fixture().await?;
    let (status, _) = common::send(&fx.app, "GET", "/me/access", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = common::send(&fx.app, "GET", "/tickets", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn access_view_reports_scope_and_matrix() -> Result<()> {
    let fx = fixture().await?;

    let (status, body) = common::send(&fx.app, "GET", "/me/access", Some(&fx.support_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "member");
    assert_eq!(body["member_id"], fx.support_member.to_string());
    assert_eq!(body["role"]["name"], "Support");
    assert_eq!(body["full_project_access"], false);
    assert_eq!(body["allowed_project_ids"], json!([fx.in_scope.to_string()]));
    assert_eq!(body["permissions"]["tickets"]["view"], "own");
    assert_eq!(body["permissions"]["tickets"]["delete"], false);

    let (_, body) = common::send(&fx.app, "GET", "/me/access", Some(&fx.admin_token), None).await?;
    assert_eq!(body["full_project_access"], true);
    assert_eq!(body["allowed_project_ids"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn user_without_membership_is_anonymous() -> Result<()> {
    let fx = fixture().await?;
    let token = common::token_for(Uuid::new_v4())?;

    let (status, body) = common::send(&fx.app, "GET", "/me/access", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "anonymous");
    assert_eq!(body["allowed_project_ids"], json!([]));
    assert_eq!(body["permissions"]["dashboard"]["view"], false);

    let (status, _) = common::send(&fx.app, "GET", "/tickets", Some(&token), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn permission_check_by_name() -> Result<()> {
    let fx = fixture().await?;
    let token = Some(fx.support_token.as_str());

    let (_, body) = common::send(&fx.app, "GET", "/me/access/check?resource=tickets&action=view", token, None).await?;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["own_only"], true);

    let (_, body) = common::send(&fx.app, "GET", "/me/access/check?resource=tickets&action=edit", token, None).await?;
    assert_eq!(body["allowed"], false);

    let (status, body) =
        common::send(&fx.app, "GET", "/me/access/check?resource=dashboard&action=delete", token, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    Ok(())
}

#[tokio::test]
async fn ticket_list_applies_ownership_and_scope() -> Result<()> {
    let fx = fixture().await?;
    let pool = &fx.db.pool;
    let me = fx.support_member;
    let other = fx.admin_member;

    let mine_in_scope = common::seed_ticket(pool, fx.org, Some(fx.in_scope), Some(me), other, "T-1").await?;
    let theirs_in_scope = common::seed_ticket(pool, fx.org, Some(fx.in_scope), Some(other), other, "T-2").await?;
    let mine_out_of_scope = common::seed_ticket(pool, fx.org, Some(fx.out_of_scope), Some(me), other, "T-3").await?;
    let mine_global = common::seed_ticket(pool, fx.org, None, Some(me), other, "T-4").await?;
    let unassigned = common::seed_ticket(pool, fx.org, Some(fx.in_scope), None, me, "T-5").await?;

    let elsewhere = common::seed_org(pool, "globex").await?;
    common::seed_ticket(pool, elsewhere, None, Some(me), me, "X-1").await?;

    let (status, body) = common::send(&fx.app, "GET", "/tickets", Some(&fx.support_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let mut visible = common::ids_of(&body);
    visible.sort();
    let mut expected = vec![mine_in_scope.to_string(), mine_global.to_string()];
    expected.sort();
    assert_eq!(visible, expected);

    let (_, body) = common::send(&fx.app, "GET", "/tickets", Some(&fx.admin_token), None).await?;
    assert_eq!(common::ids_of(&body).len(), 5, "admin sees the whole organization and nothing else");

    for hidden in [theirs_in_scope, mine_out_of_scope, unassigned] {
        let uri = format!("/tickets/{hidden}");
        let (status, _) = common::send(&fx.app, "GET", &uri, Some(&fx.support_token), None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri} should be hidden");
    }
    let uri = format!("/tickets/{mine_in_scope}");
    let (status, body) = common::send(&fx.app, "GET", &uri, Some(&fx.support_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["display_id"], "T-1");
    Ok(())
}

#[tokio::test]
async fn contractor_with_empty_scope_sees_only_own_global_tickets() -> Result<()> {
    let fx = fixture().await?;
    let pool = &fx.db.pool;
    let contractor = template("contractor").expect("built-in template");
    let role = common::seed_role(
        pool,
        fx.org,
        "Contractor",
        contractor.permissions.clone(),
        contractor.project_scope.clone(),
    )
    .await?;
    let (member, user) = common::seed_member(pool, fx.org, Some(role.id)).await?;
    let token = common::token_for(user)?;

    let global = common::seed_ticket(pool, fx.org, None, Some(member), fx.admin_member, "G-1").await?;
    common::seed_ticket(pool, fx.org, Some(fx.in_scope), Some(member), fx.admin_member, "P-1").await?;
    common::seed_ticket(pool, fx.org, None, Some(fx.admin_member), fx.admin_member, "G-2").await?;

    let (status, body) = common::send(&fx.app, "GET", "/tickets", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(common::ids_of(&body), vec![global.to_string()]);
    Ok(())
}

#[tokio::test]
async fn forms_linked_to_any_allowed_project_are_visible() -> Result<()> {
    let fx = fixture().await?;
    let pool = &fx.db.pool;
    let author = fx.admin_member;

    let shared = common::seed_form(pool, fx.org, author, "Shared", &[fx.in_scope, fx.out_of_scope]).await?;
    common::seed_form(pool, fx.org, author, "Elsewhere", &[fx.out_of_scope]).await?;
    let global = common::seed_form(pool, fx.org, author, "Org-wide", &[]).await?;

    let (status, body) = common::send(&fx.app, "GET", "/forms", Some(&fx.support_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let mut visible = common::ids_of(&body);
    visible.sort();
    let mut expected = vec![shared.to_string(), global.to_string()];
    expected.sort();
    assert_eq!(visible, expected);

    let shared_form = body
        .as_array()
        .and_then(|forms| forms.iter().find(|f| f["id"] == shared.to_string()))
        .expect("shared form present");
    assert_eq!(shared_form["project_ids"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn role_management_requires_manage_roles() -> Result<()> {
    let fx = fixture().await?;
    let body = json!({ "name": "Reviewer", "template": "viewer" });

    let (status, _) = common::send(&fx.app, "GET", "/roles", Some(&fx.support_token), None).await?;
    assert_eq!(status, StatusCode::OK, "settings.view is enough to read roles");

    let (status, err) = common::send(&fx.app, "POST", "/roles", Some(&fx.support_token), Some(body.clone())).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"], "forbidden");

    let (status, created) = common::send(&fx.app, "POST", "/roles", Some(&fx.admin_token), Some(body.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Reviewer");
    assert_eq!(created["permissions"]["crm"]["view"], true);
    assert_eq!(created["permissions"]["crm"]["edit"], false);

    let duplicate = json!({ "name": "REVIEWER" });
    let (status, _) = common::send(&fx.app, "POST", "/roles", Some(&fx.admin_token), Some(duplicate)).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = common::send(
        &fx.app,
        "POST",
        "/roles",
        Some(&fx.admin_token),
        Some(json!({ "name": "Broken", "permissions": { "tickets": { "view": true } } })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = common::send(
        &fx.app,
        "POST",
        "/roles",
        Some(&fx.admin_token),
        Some(json!({ "name": "Mystery", "template": "wizard" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, templates) = common::send(&fx.app, "GET", "/roles/templates", Some(&fx.admin_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(templates.as_array().map(Vec::len), Some(5));
    Ok(())
}

#[tokio::test]
async fn expired_token_drops_the_cached_session() -> Result<()> {
    let fx = fixture().await?;
    let admin_user = JwtConfig::new(common::JWT_SECRET, 1).decode(&fx.admin_token)?.sub;

    let (status, _) = common::send(&fx.app, "GET", "/me/access", Some(&fx.admin_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(fx.sessions.state(admin_user).is_resolved());

    let expired = JwtConfig::new(common::JWT_SECRET, -2).encode(admin_user)?;
    let (status, _) = common::send(&fx.app, "GET", "/me/access", Some(&expired), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(matches!(fx.sessions.state(admin_user), SessionState::Uninitialized));

    // A token signed with another key says nothing about the session.
    let (_, user) = common::seed_member(&fx.db.pool, fx.org, None).await?;
    fx.sessions.resolve(user).await;
    let forged = JwtConfig::new("someone-else", -2).encode(user)?;
    let (status, _) = common::send(&fx.app, "GET", "/me/access", Some(&forged), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(fx.sessions.state(user).is_resolved());
    Ok(())
}

#[tokio::test]
async fn role_created_from_template_takes_its_grants_and_scope() -> Result<()> {
    let fx = fixture().await?;

    let body = json!({ "name": "Field Crew", "template": "contractor" });
    let (status, created) = common::send(&fx.app, "POST", "/roles", Some(&fx.admin_token), Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Field Crew");
    assert_eq!(created["project_scope"], json!([]));
    assert_eq!(created["permissions"]["tickets"]["view"], "own");
    assert_eq!(created["permissions"]["settings"]["manage_roles"], false);
    assert!(created["description"].is_string());

    let body = json!({
        "name": "Roaming Crew",
        "description": "Works across every site",
        "template": "contractor",
        "project_scope": null
    });
    let (status, created) = common::send(&fx.app, "POST", "/roles", Some(&fx.admin_token), Some(body)).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["project_scope"], Value::Null);
    assert_eq!(created["description"], "Works across every site");
    assert_eq!(created["permissions"]["tickets"]["view"], "own");
    Ok(())
}

#[tokio::test]
async fn system_roles_are_protected_over_http() -> Result<()> {
    let fx = fixture().await?;
    let store = soluly::authz::SqliteRoleStore::new(fx.db.pool.clone());
    let admin = store.seed_system_roles(fx.org).await?.remove(0);
    let uri = format!("/roles/{}", admin.id);

    let (status, _) =
        common::send(&fx.app, "PUT", &uri, Some(&fx.admin_token), Some(json!({ "name": "Root" }))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = common::send(&fx.app, "DELETE", &uri, Some(&fx.admin_token), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = common::send(
        &fx.app,
        "GET",
        &format!("/roles/{}", Uuid::new_v4()),
        Some(&fx.admin_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn role_edit_takes_effect_for_signed_in_members() -> Result<()> {
    let fx = fixture().await?;
    let pool = &fx.db.pool;
    let theirs = common::seed_ticket(pool, fx.org, Some(fx.in_scope), Some(fx.admin_member), fx.admin_member, "T-9")
        .await?;

    let (_, body) = common::send(&fx.app, "GET", "/tickets", Some(&fx.support_token), None).await?;
    assert!(common::ids_of(&body).is_empty());

    let widened = support_matrix().with(Resource::Tickets, Action::View, PermissionValue::Allowed);
    let uri = format!("/roles/{}", fx.support_role);
    let (status, _) = common::send(
        &fx.app,
        "PUT",
        &uri,
        Some(&fx.admin_token),
        Some(json!({ "permissions": widened.to_json() })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = common::send(&fx.app, "GET", "/tickets", Some(&fx.support_token), None).await?;
    assert_eq!(common::ids_of(&body), vec![theirs.to_string()]);

    // Explicit null widens the scope to every project.
    let (status, updated) = common::send(
        &fx.app,
        "PUT",
        &uri,
        Some(&fx.admin_token),
        Some(json!({ "project_scope": null })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["project_scope"], Value::Null);
    Ok(())
}

#[tokio::test]
async fn role_changes_are_written_to_the_activity_log() -> Result<()> {
    let fx = fixture().await?;
    let (status, created) = common::send(
        &fx.app,
        "POST",
        "/roles",
        Some(&fx.admin_token),
        Some(json!({ "name": "Auditor", "template": "viewer" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let role_id = created["id"].as_str().unwrap_or_default().to_string();

    let mut logged: Option<(String, String)> = None;
    for _ in 0..50 {
        logged = sqlx::query_as("SELECT event_name, severity FROM activity_log WHERE subject_id = ?")
            .bind(&role_id)
            .fetch_optional(&fx.db.pool)
            .await?;
        if logged.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(logged, Some(("role.created".to_string(), "critical".to_string())));

    let chained: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM event_store WHERE event_name = 'role.created'")
        .fetch_one(&fx.db.pool)
        .await?;
    assert_eq!(chained, 1);
    Ok(())
}
