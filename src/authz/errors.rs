use std::fmt;

use super::matrix::{Action, Resource};
use super::RoleId;

/// Rejection of a permission matrix or role input before it is persisted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("permission matrix is missing resource `{0}`")]
    MissingResource(Resource),
    #[error("permission matrix is missing action `{action}` for resource `{resource}`")]
    MissingAction { resource: Resource, action: Action },
    #[error("unknown permission key `{0}`")]
    UnknownKey(String),
    #[error("invalid permission value at `{key}`: expected true, false or \"own\"")]
    InvalidValue { key: String },
    #[error("invalid project scope: expected null or an array of project ids")]
    InvalidProjectScope,
    #[error("role name must not be empty")]
    EmptyName,
}

#[derive(thiserror::Error, Debug)]
pub enum RoleStoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("a role named `{0}` already exists in this organization")]
    DuplicateName(String),
    #[error("role {0} not found")]
    NotFound(RoleId),
    #[error("system role names cannot be changed")]
    SystemRoleImmutableName,
    #[error("system roles cannot be deleted")]
    SystemRoleUndeletable,
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

pub type RoleStoreResult<T> = Result<T, RoleStoreError>;

/// The lookup a session resolution was waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStep {
    Member,
    Organization,
    Role,
}

impl fmt::Display for ResolveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolveStep::Member => "member",
            ResolveStep::Organization => "organization",
            ResolveStep::Role => "role",
        };
        f.write_str(name)
    }
}

/// Failure of the session context to reach the directory.
///
/// "No member found" is not an error: it resolves to an anonymous session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("timed out resolving {step}")]
    TimedOut { step: ResolveStep },
    #[error("directory unavailable: {0}")]
    Connectivity(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DirectoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}
