use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::models::form::Form;
use crate::models::member::{Member, Organization};
use crate::models::role::DbRole;
use crate::models::ticket::Ticket;

/// A column that could not be decoded into its domain type.
#[derive(thiserror::Error, Debug)]
pub enum RowError {
    #[error("missing column {column}: {source}")]
    Column {
        column: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("invalid {kind} in column {column}: {value}")]
    Invalid {
        column: &'static str,
        kind: &'static str,
        value: String,
    },
}

impl From<RowError> for sqlx::Error {
    fn from(err: RowError) -> Self {
        sqlx::Error::Decode(Box::new(err))
    }
}

pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    // RFC3339 (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // SQLite CURRENT_TIMESTAMP: "YYYY-MM-DD HH:MM:SS" (with optional fractional seconds)
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&ndt));
    }

    None
}

fn text(row: &SqliteRow, column: &'static str) -> Result<String, RowError> {
    row.try_get::<String, _>(column)
        .map_err(|source| RowError::Column { column, source })
}

fn opt_text(row: &SqliteRow, column: &'static str) -> Result<Option<String>, RowError> {
    row.try_get::<Option<String>, _>(column)
        .map_err(|source| RowError::Column { column, source })
}

pub fn uuid_col(row: &SqliteRow, column: &'static str) -> Result<Uuid, RowError> {
    let raw = text(row, column)?;
    Uuid::parse_str(raw.trim()).map_err(|_| RowError::Invalid { column, kind: "uuid", value: raw })
}

pub fn opt_uuid_col(row: &SqliteRow, column: &'static str) -> Result<Option<Uuid>, RowError> {
    match opt_text(row, column)? {
        Some(raw) if !raw.trim().is_empty() => Uuid::parse_str(raw.trim())
            .map(Some)
            .map_err(|_| RowError::Invalid { column, kind: "uuid", value: raw }),
        _ => Ok(None),
    }
}

fn datetime_col(row: &SqliteRow, column: &'static str) -> Result<DateTime<Utc>, RowError> {
    let raw = text(row, column)?;
    parse_datetime(&raw).ok_or(RowError::Invalid { column, kind: "datetime", value: raw })
}

/// JSON stored as TEXT. SQL NULL decodes to JSON null.
fn json_col(row: &SqliteRow, column: &'static str) -> Result<Value, RowError> {
    match opt_text(row, column)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|_| RowError::Invalid { column, kind: "json", value: raw }),
        None => Ok(Value::Null),
    }
}

/// Comma-separated uuids produced by `group_concat`.
fn uuid_list_col(row: &SqliteRow, column: &'static str) -> Result<Vec<Uuid>, RowError> {
    let Some(raw) = opt_text(row, column)? else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s).map_err(|_| RowError::Invalid { column, kind: "uuid", value: s.to_string() })
        })
        .collect()
}

pub fn db_role_from_row(row: &SqliteRow) -> Result<DbRole, RowError> {
    let is_system: i64 = row
        .try_get("is_system")
        .map_err(|source| RowError::Column { column: "is_system", source })?;

    Ok(DbRole {
        id: uuid_col(row, "id")?,
        organization_id: uuid_col(row, "organization_id")?,
        name: text(row, "name")?,
        description: opt_text(row, "description")?,
        permissions: json_col(row, "permissions")?,
        project_scope: json_col(row, "project_scope")?,
        is_system: is_system != 0,
        created_at: datetime_col(row, "created_at")?,
        updated_at: datetime_col(row, "updated_at")?,
    })
}

pub fn member_from_row(row: &SqliteRow) -> Result<Member, RowError> {
    Ok(Member {
        id: uuid_col(row, "id")?,
        organization_id: uuid_col(row, "organization_id")?,
        auth_user_id: uuid_col(row, "auth_user_id")?,
        role_id: opt_uuid_col(row, "role_id")?,
        display_name: text(row, "display_name")?,
        created_at: datetime_col(row, "created_at")?,
    })
}

pub fn organization_from_row(row: &SqliteRow) -> Result<Organization, RowError> {
    Ok(Organization {
        id: uuid_col(row, "id")?,
        name: text(row, "name")?,
        slug: text(row, "slug")?,
    })
}

pub fn ticket_from_row(row: &SqliteRow) -> Result<Ticket, RowError> {
    Ok(Ticket {
        id: uuid_col(row, "id")?,
        organization_id: uuid_col(row, "organization_id")?,
        project_id: opt_uuid_col(row, "project_id")?,
        display_id: text(row, "display_id")?,
        title: text(row, "title")?,
        status: text(row, "status")?,
        assignee_id: opt_uuid_col(row, "assignee_id")?,
        created_by: uuid_col(row, "created_by")?,
        created_at: datetime_col(row, "created_at")?,
    })
}

pub fn form_from_row(row: &SqliteRow) -> Result<Form, RowError> {
    Ok(Form {
        id: uuid_col(row, "id")?,
        organization_id: uuid_col(row, "organization_id")?,
        name: text(row, "name")?,
        created_by: uuid_col(row, "created_by")?,
        project_ids: uuid_list_col(row, "project_ids")?,
        created_at: datetime_col(row, "created_at")?,
    })
}
