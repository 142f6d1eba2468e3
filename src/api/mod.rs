mod handlers;
mod middleware;

pub use middleware::{auth_middleware, SecurityConfig};

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::store::ObjectStore;

/// Shared handler state.
///
/// Deploy passes write compute records through `computes`. Cancelling
/// `shutdown` aborts in-flight deploy passes.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub computes: Arc<dyn ObjectStore>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        let computes = Arc::new(db.clone());
        Self::with_compute_store(db, computes)
    }

    pub fn with_compute_store(db: Database, computes: Arc<dyn ObjectStore>) -> Self {
        Self {
            db,
            computes,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Router without authentication, for local use and tests.
pub fn create_router(db: Database) -> Router {
    create_router_with(AppState::new(db), SecurityConfig::disabled())
}

pub fn create_router_with(state: AppState, security: SecurityConfig) -> Router {
    let api = Router::new()
        // Nodes
        .route(
            "/nodes",
            get(handlers::list_nodes).post(handlers::create_node),
        )
        .route(
            "/nodes/{namespace}/{name}",
            get(handlers::get_node).delete(handlers::delete_node),
        )
        .route(
            "/nodes/{namespace}/{name}/deploy",
            post(handlers::deploy_node),
        )
        .route(
            "/nodes/{namespace}/{name}/computes",
            get(handlers::list_node_computes),
        )
        // External computes
        .route("/computes", get(handlers::list_computes))
        .route("/computes/{namespace}/{name}", get(handlers::get_compute))
        .route(
            "/computes/{namespace}/{name}/status",
            put(handlers::update_compute_status),
        )
        .route_layer(from_fn_with_state(security, auth_middleware))
        // Health stays reachable without a key
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
