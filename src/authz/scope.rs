//! Project-scope restriction.
//!
//! A role either sees every project (`null` scope) or only the projects in
//! its allow-list. Records that carry no project association are org-wide
//! and pass any scope; a record linked to several projects passes when any
//! one of them is in scope.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::actor::Actor;
use super::ProjectId;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Vec<ProjectId>>", into = "Option<Vec<ProjectId>>")]
pub enum ProjectScope {
    #[default]
    All,
    /// An empty allow-list means no project access at all.
    Only(BTreeSet<ProjectId>),
}

impl ProjectScope {
    pub fn only(projects: impl IntoIterator<Item = ProjectId>) -> Self {
        ProjectScope::Only(projects.into_iter().collect())
    }

    pub fn none() -> Self {
        ProjectScope::Only(BTreeSet::new())
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, ProjectScope::All)
    }

    pub fn allows(&self, project_id: &ProjectId) -> bool {
        match self {
            ProjectScope::All => true,
            ProjectScope::Only(allowed) => allowed.contains(project_id),
        }
    }

    /// Record-level rule: no association passes, otherwise any match passes.
    pub fn admits(&self, project_ids: &[ProjectId]) -> bool {
        match self {
            ProjectScope::All => true,
            ProjectScope::Only(_) if project_ids.is_empty() => true,
            ProjectScope::Only(allowed) => project_ids.iter().any(|p| allowed.contains(p)),
        }
    }

    pub fn allowed_ids(&self) -> Option<Vec<ProjectId>> {
        match self {
            ProjectScope::All => None,
            ProjectScope::Only(allowed) => Some(allowed.iter().copied().collect()),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, super::ValidationError> {
        serde_json::from_value(value.clone()).map_err(|_| super::ValidationError::InvalidProjectScope)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self.allowed_ids() {
            None => serde_json::Value::Null,
            Some(ids) => serde_json::Value::Array(
                ids.into_iter()
                    .map(|id| serde_json::Value::String(id.to_string()))
                    .collect(),
            ),
        }
    }
}

impl From<Option<Vec<ProjectId>>> for ProjectScope {
    fn from(value: Option<Vec<ProjectId>>) -> Self {
        match value {
            None => ProjectScope::All,
            Some(ids) => ProjectScope::only(ids),
        }
    }
}

impl From<ProjectScope> for Option<Vec<ProjectId>> {
    fn from(value: ProjectScope) -> Self {
        value.allowed_ids()
    }
}

fn scope_of(actor: Option<&Actor>) -> Option<&ProjectScope> {
    actor.and_then(Actor::project_scope)
}

/// True only for a resolved role whose scope is `null`.
pub fn has_full_project_access(actor: Option<&Actor>) -> bool {
    scope_of(actor).is_some_and(ProjectScope::is_unrestricted)
}

pub fn has_project_access(actor: Option<&Actor>, project_id: &ProjectId) -> bool {
    scope_of(actor).is_some_and(|scope| scope.allows(project_id))
}

/// `None` means unrestricted. Role-less actors get an empty list.
pub fn allowed_project_ids(actor: Option<&Actor>) -> Option<Vec<ProjectId>> {
    match scope_of(actor) {
        Some(scope) => scope.allowed_ids(),
        None => Some(Vec::new()),
    }
}

/// Whether a record with the given project associations is inside the
/// actor's scope. Role-less actors admit nothing.
pub fn admits(actor: Option<&Actor>, project_ids: &[ProjectId]) -> bool {
    scope_of(actor).is_some_and(|scope| scope.admits(project_ids))
}

pub fn filter_by_scope<T, F>(actor: Option<&Actor>, records: Vec<T>, project_ids_of: F) -> Vec<T>
where
    F: Fn(&T) -> &[ProjectId],
{
    let Some(scope) = scope_of(actor) else {
        if !records.is_empty() {
            tracing::debug!(dropped = records.len(), "no resolved role, scope filter yields nothing");
        }
        return Vec::new();
    };

    if scope.is_unrestricted() {
        return records;
    }

    let before = records.len();
    let kept: Vec<T> = records
        .into_iter()
        .filter(|record| scope.admits(project_ids_of(record)))
        .collect();

    tracing::debug!(before, after = kept.len(), "applied project scope");
    kept
}
