use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gate::GateMetricsSnapshot;
use crate::observability::AggregatedHealth;

/// Standard API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorResponse>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: ErrorResponse) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub store: bool,
}

/// Detailed health response is the aggregated checker output.
pub type DetailedHealthResponse = AggregatedHealth;

/// Gate statistics response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateStatsResponse {
    #[serde(flatten)]
    pub counters: GateMetricsSnapshot,
    pub replay_rate: f64,
}

impl From<GateMetricsSnapshot> for GateStatsResponse {
    fn from(counters: GateMetricsSnapshot) -> Self {
        let replay_rate = counters.replay_rate();
        Self {
            counters,
            replay_rate,
        }
    }
}

/// Demo operation response DTO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub accepted_at: DateTime<Utc>,
}
