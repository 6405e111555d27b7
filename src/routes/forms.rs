use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::authz::{filter_visible, ownership_field, Action, OwnershipField, Resource};
use crate::db::row_parsers::form_from_row;
use crate::errors::AppResult;
use crate::extract::CurrentActor;
use crate::models::form::Form;

#[utoipa::path(
    get,
    path = "/forms",
    tag = "Forms",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Forms visible to the caller", body = [Form]),
        (status = 403, description = "Missing forms.view")
    )
)]
pub async fn list_forms(State(state): State<AppState>, current: CurrentActor) -> AppResult<Json<Vec<Form>>> {
    let evaluator = state.evaluator.as_ref();
    current.require(evaluator, Resource::Forms, Action::View)?;
    let actor = &current.actor;

    let owner_column = ownership_field(Resource::Forms)
        .filter(|_| evaluator.can_view_own_only(Some(actor), Resource::Forms))
        .map(OwnershipField::column);
    let mut sql = String::from(
        "SELECT f.id, f.organization_id, f.name, f.created_by, f.created_at, group_concat(fp.project_id) AS project_ids \
         FROM forms f LEFT JOIN form_projects fp ON fp.form_id = f.id \
         WHERE f.organization_id = ?",
    );
    if let Some(column) = owner_column {
        sql.push_str(&format!(" AND f.{column} = ?"));
    }
    sql.push_str(" GROUP BY f.id ORDER BY f.created_at DESC");

    let mut query = sqlx::query(&sql).bind(actor.organization_id.to_string());
    if owner_column.is_some() {
        query = query.bind(actor.member_id.to_string());
    }
    let rows = query.fetch_all(&state.pool).await?;

    let forms = rows
        .iter()
        .map(form_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(sqlx::Error::from)?;

    Ok(Json(filter_visible(evaluator, Some(actor), Resource::Forms, forms)))
}
