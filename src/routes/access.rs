use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{parse_key, PermissionMatrix, PermissionValue, SessionState};
use crate::errors::AppResult;
use crate::extract::{settled, CurrentSession};
use crate::jwt::AuthUser;

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleSummary {
    pub id: Uuid,
    pub name: String,
    pub is_system: bool,
}

/// What the caller may do, as the UI needs it for gating.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccessView {
    pub auth_user_id: Uuid,
    /// `member` or `anonymous`
    #[schema(example = "member")]
    pub status: String,
    pub member_id: Option<Uuid>,
    pub organization_id: Option<Uuid>,
    pub role: Option<RoleSummary>,
    /// Effective matrix; all `false` without a role.
    #[schema(value_type = Object)]
    pub permissions: PermissionMatrix,
    pub full_project_access: bool,
    /// `null` when every project is accessible.
    pub allowed_project_ids: Option<Vec<Uuid>>,
}

impl AccessView {
    fn from_state(auth_user_id: Uuid, state: &SessionState) -> Self {
        let actor = state.actor();
        let role = actor.and_then(|a| a.role.as_deref());

        Self {
            auth_user_id,
            status: if actor.is_some() { "member" } else { "anonymous" }.to_string(),
            member_id: actor.map(|a| a.member_id),
            organization_id: actor.map(|a| a.organization_id),
            role: role.map(|r| RoleSummary {
                id: r.id,
                name: r.name.clone(),
                is_system: r.is_system,
            }),
            permissions: role.map(|r| r.permissions.clone()).unwrap_or_default(),
            full_project_access: state.has_full_project_access(),
            allowed_project_ids: state.allowed_project_ids(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionQuery {
    #[param(example = "tickets")]
    pub resource: String,
    #[param(example = "view")]
    pub action: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheck {
    pub resource: String,
    pub action: String,
    pub allowed: bool,
    /// Granted only for records the caller owns.
    pub own_only: bool,
}

#[utoipa::path(
    get,
    path = "/me/access",
    tag = "Access",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Resolved access for the caller", body = AccessView),
        (status = 503, description = "Directory unavailable"),
        (status = 504, description = "Directory lookup timed out")
    )
)]
pub async fn my_access(session: CurrentSession) -> AppResult<Json<AccessView>> {
    Ok(Json(AccessView::from_state(session.auth_user_id, &session.state)))
}

#[utoipa::path(
    get,
    path = "/me/access/check",
    tag = "Access",
    security(("bearerAuth" = [])),
    params(PermissionQuery),
    responses((status = 200, description = "Permission decision", body = PermissionCheck))
)]
pub async fn check_permission(
    session: CurrentSession,
    Query(query): Query<PermissionQuery>,
) -> AppResult<Json<PermissionCheck>> {
    let allowed = session.state.has_permission_named(&query.resource, &query.action);
    let own_only = parse_key(&query.resource, &query.action)
        .zip(session.state.actor())
        .is_some_and(|((resource, action), actor)| actor.permission(resource, action) == PermissionValue::OwnOnly);

    Ok(Json(PermissionCheck {
        resource: query.resource,
        action: query.action,
        allowed,
        own_only,
    }))
}

/// Re-resolves the caller's session, e.g. after an admin changed their role.
#[utoipa::path(
    post,
    path = "/me/refresh",
    tag = "Access",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Freshly resolved access", body = AccessView),
        (status = 503, description = "Directory unavailable"),
        (status = 504, description = "Directory lookup timed out")
    )
)]
pub async fn refresh(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<AccessView>> {
    let session = settled(state.sessions.refresh(auth.auth_user_id).await)?;
    Ok(Json(AccessView::from_state(auth.auth_user_id, &session)))
}
