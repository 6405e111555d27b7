//! Authorization: permission matrix, project scope and session context.
//!
//! - [`matrix`]: the closed resource/action schema and per-role grants
//! - [`scope`]: per-role project allow-lists and record filtering
//! - [`evaluator`]: pure policy decisions over a resolved [`Actor`]
//! - [`session`]: per-user actor resolution, caching and invalidation
//! - [`store`]: the role store, the only writer of role data
//!
//! # Tenant isolation
//!
//! Nothing in this module checks `organization_id` on records. Callers must
//! restrict every query to the actor's organization before handing records
//! to the evaluator or the scope filters; those only refine within a tenant.

pub mod actor;
pub mod directory;
pub mod errors;
pub mod evaluator;
pub mod matrix;
pub mod record;
pub mod scope;
pub mod session;
pub mod store;
pub mod templates;

pub use actor::Actor;
pub use directory::{DirectoryBackend, SqliteDirectory};
pub use errors::{DirectoryError, ResolveError, ResolveStep, RoleStoreError, RoleStoreResult, ValidationError};
pub use evaluator::{filter_visible, ownership_field, DefaultPolicyEvaluator, PolicyEvaluator};
pub use matrix::{merge_template, parse_key, validate, Action, PermissionMatrix, PermissionValue, Resource};
pub use record::{OwnershipField, ScopedRecord};
pub use scope::{
    allowed_project_ids, filter_by_scope, has_full_project_access, has_project_access,
    ProjectScope,
};
pub use session::{Resolution, SessionConfig, SessionContext, SessionState};
pub use store::{RoleInvalidation, SqliteRoleStore};
pub use templates::{builtin_templates, template, RoleTemplate};

use uuid::Uuid;

pub type MemberId = Uuid;
pub type OrganizationId = Uuid;
pub type RoleId = Uuid;
pub type ProjectId = Uuid;
/// Identity issued by the external auth provider (the JWT `sub`).
pub type AuthUserId = Uuid;
