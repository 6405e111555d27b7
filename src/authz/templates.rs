//! Built-in role templates.
//!
//! Templates are read-only starting points for the role editor, not stored
//! roles. Picking one overwrites the role's matrix and scope entirely.

use std::sync::OnceLock;

use super::matrix::{Action, PermissionMatrix, PermissionValue, Resource};
use super::scope::ProjectScope;

#[derive(Debug, Clone)]
pub struct RoleTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: PermissionMatrix,
    pub project_scope: ProjectScope,
}

use PermissionValue::{Allowed, Denied, OwnOnly};

fn admin() -> RoleTemplate {
    RoleTemplate {
        key: "admin",
        name: "Admin",
        description: "Full access to every area, including organization settings",
        permissions: PermissionMatrix::full(),
        project_scope: ProjectScope::All,
    }
}

fn manager() -> RoleTemplate {
    let permissions = PermissionMatrix::from_fn(|resource, action| match (resource, action) {
        (Resource::Settings, Action::View) => Allowed,
        (Resource::Settings, _) => Denied,
        (Resource::Financials | Resource::Expenses, Action::Delete) => Denied,
        _ => Allowed,
    });

    RoleTemplate {
        key: "manager",
        name: "Manager",
        description: "Runs projects and teams without organization administration",
        permissions,
        project_scope: ProjectScope::All,
    }
}

fn member() -> RoleTemplate {
    let permissions = PermissionMatrix::from_fn(|resource, action| match (resource, action) {
        (Resource::Dashboard | Resource::Projects | Resource::Team | Resource::Crm, Action::View) => Allowed,
        (Resource::Tickets | Resource::Feedback | Resource::Forms | Resource::Features, Action::View) => Allowed,
        (Resource::Tickets | Resource::Feedback | Resource::Forms | Resource::Features, Action::Create) => Allowed,
        (Resource::Tickets | Resource::Feedback | Resource::Forms, Action::Edit) => OwnOnly,
        (Resource::Emails, Action::View) => OwnOnly,
        _ => Denied,
    });

    RoleTemplate {
        key: "member",
        name: "Member",
        description: "Day-to-day work on tickets, feedback and forms",
        permissions,
        project_scope: ProjectScope::All,
    }
}

fn viewer() -> RoleTemplate {
    let permissions = PermissionMatrix::from_fn(|_, action| {
        if action == Action::View {
            Allowed
        } else {
            Denied
        }
    });

    RoleTemplate {
        key: "viewer",
        name: "Viewer",
        description: "Read-only access to every area",
        permissions,
        project_scope: ProjectScope::All,
    }
}

fn contractor() -> RoleTemplate {
    let permissions = PermissionMatrix::from_fn(|resource, action| match (resource, action) {
        (Resource::Dashboard | Resource::Projects, Action::View) => Allowed,
        (Resource::Tickets | Resource::Feedback, Action::View | Action::Edit) => OwnOnly,
        (Resource::Tickets | Resource::Feedback, Action::Create) => Allowed,
        _ => Denied,
    });

    RoleTemplate {
        key: "contractor",
        name: "Contractor",
        description: "External collaborator limited to assigned projects and their own tickets",
        permissions,
        // Projects are added to the allow-list after the role is created.
        project_scope: ProjectScope::none(),
    }
}

pub fn builtin_templates() -> &'static [RoleTemplate] {
    static TEMPLATES: OnceLock<Vec<RoleTemplate>> = OnceLock::new();
    TEMPLATES.get_or_init(|| vec![admin(), manager(), member(), viewer(), contractor()])
}

/// Finds a template by key or display name, ignoring case.
pub fn template(name: &str) -> Option<&'static RoleTemplate> {
    let name = name.trim();
    builtin_templates()
        .iter()
        .find(|t| t.key.eq_ignore_ascii_case(name) || t.name.eq_ignore_ascii_case(name))
}
