use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{
    DefaultPolicyEvaluator, PolicyEvaluator, SessionConfig, SessionContext, SqliteDirectory, SqliteRoleStore,
};
use crate::docs;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{access, auth, forms, health, roles, tickets};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub sessions: Arc<SessionContext>,
    pub roles: SqliteRoleStore,
    pub evaluator: Arc<dyn PolicyEvaluator>,
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires the session context to the role store and starts the activity
    /// listener. Must be called inside a Tokio runtime.
    pub fn new(pool: SqlitePool, jwt: JwtConfig, session_config: SessionConfig) -> Self {
        let directory = Arc::new(SqliteDirectory::new(pool.clone()));
        let sessions = Arc::new(SessionContext::new(directory, session_config));
        let roles = SqliteRoleStore::new(pool.clone()).with_invalidation(sessions.clone());

        let (event_bus, rx) = init_event_bus();
        tokio::spawn(start_activity_listener(rx, pool.clone()));

        Self {
            pool,
            jwt: Arc::new(jwt),
            sessions,
            roles,
            evaluator: Arc::new(DefaultPolicyEvaluator::new()),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let session_config = SessionConfig::from_env()?;
    let state = AppState::new(pool, jwt_config, session_config);

    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new().route("/logout", post(auth::logout));

    let me_routes = Router::new()
        .route("/access", get(access::my_access))
        .route("/access/check", get(access::check_permission))
        .route("/refresh", post(access::refresh));

    let role_routes = Router::new()
        .route("/", get(roles::list_roles).post(roles::create_role))
        .route("/templates", get(roles::list_templates))
        .route(
            "/:id",
            get(roles::get_role).put(roles::update_role).delete(roles::delete_role),
        );

    let ticket_routes = Router::new()
        .route("/", get(tickets::list_tickets))
        .route("/:id", get(tickets::get_ticket));

    let form_routes = Router::new().route("/", get(forms::list_forms));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/me", me_routes)
        .nest("/roles", role_routes)
        .nest("/tickets", ticket_routes)
        .nest("/forms", form_routes)
        .merge(docs::openapi_routes(docs::build_openapi(None)))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
