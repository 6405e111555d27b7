use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{filter_visible, ownership_field, Action, OwnershipField, Resource};
use crate::db::row_parsers::ticket_from_row;
use crate::errors::{AppError, AppResult};
use crate::extract::CurrentActor;
use crate::models::ticket::Ticket;

const TICKET_COLUMNS: &str =
    "id, organization_id, project_id, display_id, title, status, assignee_id, created_by, created_at";

#[utoipa::path(
    get,
    path = "/tickets",
    tag = "Tickets",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Tickets visible to the caller", body = [Ticket]),
        (status = 403, description = "Missing tickets.view")
    )
)]
pub async fn list_tickets(State(state): State<AppState>, current: CurrentActor) -> AppResult<Json<Vec<Ticket>>> {
    let evaluator = state.evaluator.as_ref();
    current.require(evaluator, Resource::Tickets, Action::View)?;
    let actor = &current.actor;

    let owner_column = ownership_field(Resource::Tickets)
        .filter(|_| evaluator.can_view_own_only(Some(actor), Resource::Tickets))
        .map(OwnershipField::column);
    let mut sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE organization_id = ?");
    if let Some(column) = owner_column {
        sql.push_str(&format!(" AND {column} = ?"));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query(&sql).bind(actor.organization_id.to_string());
    if owner_column.is_some() {
        query = query.bind(actor.member_id.to_string());
    }
    let rows = query.fetch_all(&state.pool).await?;

    let tickets = rows
        .iter()
        .map(ticket_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlx::Error::from)?;

    Ok(Json(filter_visible(evaluator, Some(actor), Resource::Tickets, tickets)))
}

/// Tickets the caller cannot see are reported as missing.
#[utoipa::path(
    get,
    path = "/tickets/{id}",
    tag = "Tickets",
    security(("bearerAuth" = [])),
    params(("id" = Uuid, Path, description = "Ticket id")),
    responses(
        (status = 200, description = "Ticket", body = Ticket),
        (status = 404, description = "Ticket not found or not visible")
    )
)]
pub async fn get_ticket(
    State(state): State<AppState>,
    current: CurrentActor,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Ticket>> {
    let evaluator = state.evaluator.as_ref();
    current.require(evaluator, Resource::Tickets, Action::View)?;

    let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ? AND organization_id = ?");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .bind(current.actor.organization_id.to_string())
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("ticket not found"))?;
    let ticket = ticket_from_row(&row).map_err(sqlx::Error::from)?;

    if !evaluator.can_on_record(Some(&current.actor), Resource::Tickets, Action::View, &ticket) {
        return Err(AppError::not_found("ticket not found"));
    }
    Ok(Json(ticket))
}
