use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use http_body_util::BodyExt;
use uuid::Uuid;

use crate::api::responses::{ApiResponse, ErrorResponse};
use crate::api::routes::AppState;
use crate::gate::{is_mutating, Decision};
use crate::observability::get_metrics;
use crate::observability::logging::mask_key;

/// Request header carrying the client-supplied idempotency token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Marker header added to short-circuited replay responses.
pub const REPLAYED_HEADER: &str = "x-idempotent-replayed";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Host adapter between HTTP requests and the gate.
///
/// Consults the gate before the handler and finalizes after it. Requests
/// without a key, and non-mutating requests, pass through untouched. Any gate
/// failure fails closed: the request is rejected rather than executed under
/// uncertain idempotency state.
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let key = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !is_mutating(&method) || key.trim().is_empty() {
        return next.run(request).await;
    }

    // One holder id per request attempt; retries of the same logical request
    // arrive with fresh ids and are arbitrated purely by the stored record.
    let holder_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match state.gate.enter(&method, &key, &holder_id).await {
        Ok(Decision::Proceed) => {}
        Ok(Decision::Replay { status_code, body }) => {
            return replay_response(status_code, body);
        }
        Ok(Decision::Conflict { key }) => {
            return conflict_response(&key);
        }
        Err(e) => {
            tracing::error!(key = %mask_key(&key), "Error while filtering idempotency: {}", e);
            get_metrics().record_filter_failure("enter");
            return filter_failure_response();
        }
    }

    let response = next.run(request).await;
    let (parts, mut body) = response.into_parts();

    // Buffer the handler response only up to the cacheable cap. A body that
    // exceeds it cannot be replayed anyway, so the rest streams through
    // untouched and the record is left pending until its TTL lapses.
    let cap = state.max_cacheable_body_bytes as usize;
    let mut buffered: Vec<u8> = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(key = %mask_key(&key), "Error while buffering response: {}", e);
                get_metrics().record_filter_failure("finish");
                return filter_failure_response();
            }
        };
        if let Ok(data) = frame.into_data() {
            buffered.extend_from_slice(&data);
            if buffered.len() > cap {
                tracing::debug!(
                    key = %mask_key(&key),
                    "Response exceeds cacheable size, leaving record pending"
                );
                let head = futures_util::stream::once(async move {
                    Ok::<_, axum::Error>(Bytes::from(buffered))
                });
                let tail = body.into_data_stream();
                return Response::from_parts(parts, Body::from_stream(head.chain(tail)));
            }
        }
    }
    let bytes = Bytes::from(buffered);

    // A cacheable result is a non-empty UTF-8 body; an empty one leaves the
    // record pending until its TTL lapses.
    let outcome = if bytes.is_empty() {
        None
    } else {
        std::str::from_utf8(&bytes)
            .ok()
            .map(|body| (parts.status.as_u16(), body.to_string()))
    };

    if let Err(e) = state.gate.finish(&method, &key, &holder_id, outcome).await {
        tracing::error!(key = %mask_key(&key), "Error while caching response: {}", e);
        get_metrics().record_filter_failure("finish");
        return filter_failure_response();
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn replay_response(status_code: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
        .headers_mut()
        .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
    response
}

fn conflict_response(key: &str) -> Response {
    (
        StatusCode::CONFLICT,
        Json(ApiResponse::<()>::error(ErrorResponse::new(
            "CONFLICT",
            format!("Request with idempotency-key: {} is in progress", key),
        ))),
    )
        .into_response()
}

fn filter_failure_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error(ErrorResponse::new(
            "IDEMPOTENCY_FILTER_FAILED",
            "Error occurred while filtering idempotency",
        ))),
    )
        .into_response()
}
