use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{builtin_templates, merge_template, template, Action, PermissionMatrix, ProjectScope, Resource};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RequestContext};
use crate::extract::CurrentActor;
use crate::models::role::{NewRole, Role, RoleCreateRequest, RoleTemplateView, RoleUpdateRequest};

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Roles of the caller's organization", body = [Role]),
        (status = 403, description = "Missing settings.view")
    )
)]
pub async fn list_roles(State(state): State<AppState>, current: CurrentActor) -> AppResult<Json<Vec<Role>>> {
    current.require(state.evaluator.as_ref(), Resource::Settings, Action::View)?;
    let roles = state.roles.list(current.actor.organization_id).await?;
    Ok(Json(roles))
}

#[utoipa::path(
    get,
    path = "/roles/templates",
    tag = "Roles",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Built-in role templates", body = [RoleTemplateView]))
)]
pub async fn list_templates(
    State(state): State<AppState>,
    current: CurrentActor,
) -> AppResult<Json<Vec<RoleTemplateView>>> {
    current.require(state.evaluator.as_ref(), Resource::Settings, Action::View)?;
    Ok(Json(builtin_templates().iter().map(RoleTemplateView::from).collect()))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = Role),
        (status = 404, description = "Role not found in this organization")
    )
)]
pub async fn get_role(
    State(state): State<AppState>,
    current: CurrentActor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    current.require(state.evaluator.as_ref(), Resource::Settings, Action::View)?;
    let role = state.roles.get(current.actor.organization_id, id).await?;
    Ok(Json(role))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    security(("bearerAuth" = [])),
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Invalid matrix, scope or template"),
        (status = 403, description = "Missing settings.manage_roles"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn create_role(
    State(state): State<AppState>,
    current: CurrentActor,
    headers: HeaderMap,
    Json(payload): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    current.require(state.evaluator.as_ref(), Resource::Settings, Action::ManageRoles)?;

    let mut input = NewRole::new(payload.name, PermissionMatrix::default_matrix(), ProjectScope::All);
    input.description = payload.description;
    if let Some(key) = payload.template.as_deref() {
        let template =
            template(key).ok_or_else(|| AppError::bad_request(format!("unknown role template `{key}`")))?;
        input.permissions = merge_template(input.permissions, &template.permissions);
        input.project_scope = template.project_scope.clone();
        input.description = input.description.or_else(|| Some(template.description.to_string()));
    }
    if let Some(permissions) = payload.permissions.as_ref() {
        input.permissions = PermissionMatrix::from_json(permissions)?;
    }
    if let Some(scope) = payload.project_scope.as_ref() {
        input.project_scope = ProjectScope::from_json(scope)?;
    }

    let role = state.roles.create(current.actor.organization_id, input).await?;

    log_activity(
        &state.event_bus,
        "created",
        current.activity(),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    put,
    path = "/roles/{id}",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 400, description = "Invalid matrix or scope"),
        (status = 404, description = "Role not found in this organization"),
        (status = 409, description = "Name taken, or renaming a system role")
    )
)]
pub async fn update_role(
    State(state): State<AppState>,
    current: CurrentActor,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    current.require(state.evaluator.as_ref(), Resource::Settings, Action::ManageRoles)?;
    let organization_id = current.actor.organization_id;

    let patch = payload.into_patch()?;
    let before = state.roles.get(organization_id, id).await?;
    let role = state.roles.update(organization_id, id, patch).await?;

    log_activity(
        &state.event_bus,
        "updated",
        current.activity(),
        &role,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    tag = "Roles",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found in this organization"),
        (status = 409, description = "System roles cannot be deleted")
    )
)]
pub async fn delete_role(
    State(state): State<AppState>,
    current: CurrentActor,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current.require(state.evaluator.as_ref(), Resource::Settings, Action::ManageRoles)?;

    let deleted = state.roles.delete(current.actor.organization_id, id).await?;

    log_activity(
        &state.event_bus,
        "deleted",
        current.activity(),
        &deleted,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
