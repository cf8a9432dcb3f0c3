use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::idempotency_middleware;
use crate::gate::IdempotencyGate;
use crate::observability::HealthChecker;

/// Application state shared across handlers and the middleware.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<IdempotencyGate>,
    pub health_checker: Arc<HealthChecker>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub max_cacheable_body_bytes: u64,
}

impl AppState {
    pub fn new(gate: Arc<IdempotencyGate>, health_checker: Arc<HealthChecker>) -> Self {
        Self {
            gate,
            health_checker,
            metrics_handle: None,
            max_cacheable_body_bytes: 262_144,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Overrides the cacheable body cap.
    pub fn with_body_cap(mut self, max_cacheable_body_bytes: u64) -> Self {
        self.max_cacheable_body_bytes = max_cacheable_body_bytes;
        self
    }
}

/// Creates the main API router with all routes.
///
/// Every route passes through the idempotency middleware; non-mutating routes
/// are never gated, so the health and stats endpoints are unaffected.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoints
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/idempotency/stats", get(handlers::gate_stats))
        // Demo mutating endpoint
        .route("/operations", post(handlers::submit_operation))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        // Outermost: a request id must exist before the gate derives its holder id.
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
