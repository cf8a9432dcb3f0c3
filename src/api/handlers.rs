use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::responses::{
    ApiResponse, DetailedHealthResponse, ErrorResponse, GateStatsResponse, HealthResponse,
    OperationResponse,
};

use super::routes::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let store_health = state.health_checker.check_store().await;

    let response = HealthResponse {
        status: if store_health.status.is_unhealthy() {
            "degraded".to_string()
        } else {
            "healthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        store: !store_health.status.is_unhealthy(),
    };

    Json(ApiResponse::success(response))
}

/// Detailed health check with per-dependency latency.
pub async fn detailed_health_check(
    State(state): State<AppState>,
) -> Json<ApiResponse<DetailedHealthResponse>> {
    Json(ApiResponse::success(state.health_checker.check_all().await))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Gate counter snapshot.
pub async fn gate_stats(State(state): State<AppState>) -> Json<ApiResponse<GateStatsResponse>> {
    let snapshot = state.gate.metrics().snapshot();
    Json(ApiResponse::success(GateStatsResponse::from(snapshot)))
}

// ============================================================================
// Demo operation handler (gated by the idempotency middleware)
// ============================================================================

/// Request to submit an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOperationRequest {
    pub name: String,
    pub payload: Option<serde_json::Value>,
}

/// Accepts a mutating operation. Each execution mints a fresh id, so a
/// replayed response is distinguishable from a re-executed one.
pub async fn submit_operation(
    Json(request): Json<SubmitOperationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OperationResponse>>), (StatusCode, Json<ApiResponse<()>>)>
{
    if request.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(ErrorResponse::new(
                "VALIDATION_ERROR",
                "name cannot be empty",
            ))),
        ));
    }

    let response = OperationResponse {
        id: Uuid::new_v4(),
        name: request.name,
        status: "accepted".to_string(),
        accepted_at: Utc::now(),
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}
