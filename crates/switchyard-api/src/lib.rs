//! switchyard-api — REST API for Switchyard.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/routes` | List routes with their committed split |
//! | GET | `/api/v1/routes/{id}` | Route rule, active backend, container capacity |
//! | GET | `/api/v1/routes/{id}/weights` | Committed weight split |
//! | GET | `/api/v1/routes/{id}/capacity` | Container desired/running counts |
//! | POST | `/api/v1/routes/{id}/migrate` | Migrate the route: `{"target": "function" \| "container"}` |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use switchyard_migrate::MigrationRegistry;
use switchyard_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub registry: Arc<MigrationRegistry>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/routes", get(handlers::list_routes))
        .route("/routes/{id}", get(handlers::get_route))
        .route("/routes/{id}/weights", get(handlers::get_weights))
        .route("/routes/{id}/capacity", get(handlers::get_capacity))
        .route("/routes/{id}/migrate", post(handlers::migrate))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
