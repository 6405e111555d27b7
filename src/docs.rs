use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::Value;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};

use crate::{models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::logout,
		routes::access::my_access,
		routes::access::check_permission,
		routes::access::refresh,
		routes::roles::list_roles,
		routes::roles::list_templates,
		routes::roles::get_role,
		routes::roles::create_role,
		routes::roles::update_role,
		routes::roles::delete_role,
		routes::tickets::list_tickets,
		routes::tickets::get_ticket,
		routes::forms::list_forms
	),
	components(
		schemas(
			routes::health::HealthResponse,
			routes::auth::MessageResponse,
			routes::access::AccessView,
			routes::access::RoleSummary,
			routes::access::PermissionCheck,
			models::role::Role,
			models::role::RoleCreateRequest,
			models::role::RoleUpdateRequest,
			models::role::RoleTemplateView,
			models::ticket::Ticket,
			models::form::Form
		)
	),
	modifiers(&BearerAuth),
	tags(
		(name = "Health", description = "Liveness"),
		(name = "Auth", description = "Session lifecycle"),
		(name = "Access", description = "Resolved permissions of the caller"),
		(name = "Roles", description = "Role and permission management"),
		(name = "Tickets", description = "Scoped ticket reads"),
		(name = "Forms", description = "Scoped form reads")
	)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearerAuth",
			SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
		);
	}
}

/// The OpenAPI document, optionally advertising a local server.
pub fn build_openapi(port: Option<u16>) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();
	if let Some(port) = port {
		doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
	}
	doc
}

pub fn openapi_routes<S>(doc: utoipa::openapi::OpenApi) -> Router<S>
where
	S: Clone + Send + Sync + 'static,
{
	let doc_json = Arc::new(serde_json::to_value(&doc).unwrap_or(Value::Null));

	Router::new().route(
		"/api-docs/openapi.json",
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		}),
	)
}
