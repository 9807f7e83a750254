//! REST API handlers.
//!
//! Reads go through the route's controllers so they reflect the routing
//! layer, not a cached view. Migration requests return the run's report
//! directly as the response body.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use switchyard_core::{BackendId, CapacityState, MigrationRequest, RouteId, WeightSplit};
use switchyard_migrate::{
    CapacityController, MigrationReport, RejectReason, RunStatus, WeightController,
};
use tracing::{error, warn};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Route listing entry.
#[derive(Debug, Serialize)]
pub struct RouteSummary {
    pub route: RouteId,
    pub path: String,
    pub priority: u32,
    pub split: WeightSplit,
    /// `None` only if the committed split is blackout or split-brain.
    pub active: Option<BackendId>,
}

/// Full view of one route.
#[derive(Debug, Serialize)]
pub struct RouteDetail {
    #[serde(flatten)]
    pub summary: RouteSummary,
    pub function_pool: String,
    pub container_pool: String,
    pub warm_capacity: u32,
    pub capacity: CapacityState,
    pub migrating: bool,
}

// ── Routes ─────────────────────────────────────────────────────

/// GET /api/v1/routes
pub async fn list_routes(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_routes() {
        Ok(rules) => {
            let summaries: Vec<RouteSummary> = rules
                .into_iter()
                .map(|rule| RouteSummary {
                    active: rule.split.active(),
                    route: rule.route,
                    path: rule.path,
                    priority: rule.priority,
                    split: rule.split,
                })
                .collect();
            ApiResponse::ok(summaries).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/routes/:id
pub async fn get_route(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(orch) = state.registry.get(&id) else {
        return error_response("route not found", StatusCode::NOT_FOUND).into_response();
    };
    let rule = match state.store.get_route(&id) {
        Ok(Some(rule)) => rule,
        Ok(None) => return error_response("route not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    let capacity = match orch.capacity().get_state(BackendId::Container).await {
        Ok(capacity) => capacity,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response(),
    };

    let pools = orch.pools();
    let detail = RouteDetail {
        function_pool: pools.get(BackendId::Function).handle.clone(),
        container_pool: pools.get(BackendId::Container).handle.clone(),
        warm_capacity: orch.warm_capacity(),
        capacity,
        migrating: orch.is_running(),
        summary: RouteSummary {
            active: rule.split.active(),
            route: rule.route,
            path: rule.path,
            priority: rule.priority,
            split: rule.split,
        },
    };
    ApiResponse::ok(detail).into_response()
}

/// GET /api/v1/routes/:id/weights
pub async fn get_weights(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(orch) = state.registry.get(&id) else {
        return error_response("route not found", StatusCode::NOT_FOUND).into_response();
    };
    match orch.weights().get_weights(&id).await {
        Ok(split) => ApiResponse::ok(split).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response(),
    }
}

/// GET /api/v1/routes/:id/capacity
pub async fn get_capacity(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(orch) = state.registry.get(&id) else {
        return error_response("route not found", StatusCode::NOT_FOUND).into_response();
    };
    match orch.capacity().get_state(BackendId::Container).await {
        Ok(capacity) => ApiResponse::ok(capacity).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::BAD_GATEWAY).into_response(),
    }
}

// ── Migration ──────────────────────────────────────────────────

/// POST /api/v1/routes/:id/migrate
///
/// The run is spawned so a client disconnect can't abandon it halfway;
/// the handler waits for the terminal report. A body without a string
/// `target` is rejected like any other invalid target.
pub async fn migrate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<MigrationRequest>, JsonRejection>,
) -> impl IntoResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            let reason = if state.registry.get(&id).is_some() {
                RejectReason::InvalidTarget
            } else {
                RejectReason::UnknownRoute
            };
            warn!(route = %id, error = %rejection.body_text(), "migration request body rejected");
            let report = MigrationReport::rejected(&id, None, reason);
            return (report_status(&report), Json(report)).into_response();
        }
    };

    let registry = state.registry.clone();
    let route = id.clone();
    let run = tokio::spawn(async move { registry.migrate(&route, &req).await });

    match run.await {
        Ok(report) => (report_status(&report), Json(report)).into_response(),
        Err(e) => {
            error!(route = %id, error = %e, "migration task aborted");
            error_response("migration task aborted", StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    }
}

/// HTTP status for a migration report.
pub fn report_status(report: &MigrationReport) -> StatusCode {
    match &report.status {
        RunStatus::Succeeded => StatusCode::OK,
        RunStatus::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        RunStatus::Failed { .. } => StatusCode::BAD_GATEWAY,
        RunStatus::Rejected { reason } => match reason {
            RejectReason::MigrationInProgress => StatusCode::CONFLICT,
            RejectReason::InvalidTarget => StatusCode::BAD_REQUEST,
            RejectReason::UnknownRoute => StatusCode::NOT_FOUND,
        },
    }
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use switchyard_core::{MigrationSettings, RouteSpec};
    use switchyard_migrate::MigrationRegistry;
    use switchyard_state::StateStore;

    fn test_state() -> ApiState {
        let store = StateStore::open_in_memory().unwrap();
        let routes = vec![RouteSpec {
            id: "route1".to_string(),
            path: "/route1".to_string(),
            priority: 1,
            function_pool: "tg-fn".to_string(),
            container_pool: "tg-ctr".to_string(),
            warm_capacity: Some(1),
        }];
        let settings = MigrationSettings {
            poll_interval: Duration::from_millis(10),
            deadline: Duration::from_millis(200),
            ..Default::default()
        };
        let registry = MigrationRegistry::from_store(&store, &routes, &settings, None).unwrap();
        ApiState {
            store,
            registry: Arc::new(registry),
        }
    }

    #[tokio::test]
    async fn list_routes_shows_function_active() {
        let state = test_state();
        let resp = list_routes(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let state = test_state();
        let resp = get_weights(State(state.clone()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = get_route(State(state), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn migrate_to_container_when_warm() {
        let state = test_state();
        state.store.set_running("route1", 1).unwrap();

        let resp = migrate(
            State(state.clone()),
            Path("route1".to_string()),
            Ok(Json(MigrationRequest::to(BackendId::Container))),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            state.store.get_split("route1").unwrap().active(),
            Some(BackendId::Container)
        );
    }

    #[tokio::test]
    async fn migrate_times_out_when_container_stays_cold() {
        let state = test_state();

        let resp = migrate(
            State(state.clone()),
            Path("route1".to_string()),
            Ok(Json(MigrationRequest::to(BackendId::Container))),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            state.store.get_split("route1").unwrap().active(),
            Some(BackendId::Function)
        );
    }

    #[tokio::test]
    async fn invalid_target_is_bad_request() {
        let state = test_state();
        let resp = migrate(
            State(state),
            Path("route1".to_string()),
            Ok(Json(MigrationRequest {
                target: "banana".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn report_status_mapping() {
        let report = MigrationReport::rejected("r", None, RejectReason::MigrationInProgress);
        assert_eq!(report_status(&report), StatusCode::CONFLICT);
        let report = MigrationReport::rejected("r", None, RejectReason::UnknownRoute);
        assert_eq!(report_status(&report), StatusCode::NOT_FOUND);
    }
}
