//! HTTP surface: expiry routes under `/api`, plus health, readiness and metrics.

use axum::{
    Router,
    extract::State,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_helpers::server::{HealthCheckFuture, health_router, run_health_checks};
use std::sync::Arc;

use crate::openapi::ApiDoc;
use crate::state::AppState;

/// The complete application router.
pub fn app(state: &AppState) -> Router {
    axum_helpers::create_router::<ApiDoc>(routes(state))
        .merge(health_router(state.config.app))
        .merge(ready_router(state.clone()))
        .route("/metrics", get(observability::metrics_handler))
        .layer(middleware::from_fn(observability::http_metrics))
}

/// API routes without the `/api` prefix; `create_router` adds it.
pub fn routes(state: &AppState) -> Router {
    domain_expiry::handlers::router(Arc::clone(&state.orchestrator))
}

pub fn ready_router(state: AppState) -> Router {
    Router::new()
        .route("/ready", get(ready_handler))
        .with_state(state)
}

/// Readiness: the database must answer and the mail transport must be usable.
async fn ready_handler(State(state): State<AppState>) -> Response {
    let checks: Vec<(&str, HealthCheckFuture<'_>)> = vec![
        (
            "database",
            Box::pin(async {
                database::postgres::check_health(&state.db)
                    .await
                    .map_err(|e| format!("Database check failed: {}", e))
            }),
        ),
        (
            "mail",
            Box::pin(async {
                state
                    .orchestrator
                    .dispatcher()
                    .health_check()
                    .await
                    .map_err(|e| format!("Mail transport check failed: {}", e))
            }),
        ),
    ];

    match run_health_checks(checks).await {
        Ok((status, json)) => (status, json).into_response(),
        Err((status, json)) => (status, json).into_response(),
    }
}
