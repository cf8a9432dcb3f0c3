mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use idempotency_gate::api::{
    create_router, idempotency_middleware, AppState, IDEMPOTENCY_KEY_HEADER, REPLAYED_HEADER,
};
use idempotency_gate::gate::{IdempotencyGate, IdempotencyRecord};
use idempotency_gate::observability::HealthChecker;
use idempotency_gate::store::{MemoryRecordStore, RecordStore};
use tower::ServiceExt;

fn test_state() -> (AppState, Arc<MemoryRecordStore>) {
    let store = Arc::new(MemoryRecordStore::new());
    let gate = Arc::new(IdempotencyGate::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        common::TEST_TTL_SECONDS,
    ));
    let health_checker = Arc::new(HealthChecker::new(
        Arc::clone(&store) as Arc<dyn RecordStore>
    ));
    (AppState::new(gate, health_checker), store)
}

fn test_app() -> (Router, Arc<MemoryRecordStore>) {
    let (state, store) = test_state();
    (create_router(state), store)
}

fn test_app_with_cap(max_cacheable_body_bytes: u64) -> (Router, Arc<MemoryRecordStore>) {
    let (state, store) = test_state();
    (
        create_router(state.with_body_cap(max_cacheable_body_bytes)),
        store,
    )
}

fn post_operation(key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/operations")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
    }
    builder
        .body(Body::from(r#"{"name":"charge-card"}"#))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _store) = test_app();

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("healthy"));
}

#[tokio::test]
async fn test_operation_without_key_is_never_gated() {
    let (app, store) = test_app();

    let first = app.clone().oneshot(post_operation(None)).await.unwrap();
    let second = app.oneshot(post_operation(None)).await.unwrap();

    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(second.status(), StatusCode::CREATED);

    // Each execution minted a fresh id, and nothing was persisted.
    let first_body: serde_json::Value =
        serde_json::from_str(&body_string(first).await).unwrap();
    let second_body: serde_json::Value =
        serde_json::from_str(&body_string(second).await).unwrap();
    assert_ne!(first_body["data"]["id"], second_body["data"]["id"]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_keyed_operation_replays_original_response() {
    let (app, _store) = test_app();

    let first = app
        .clone()
        .oneshot(post_operation(Some("order-123")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    assert!(first.headers().get(REPLAYED_HEADER).is_none());
    let first_body = body_string(first).await;

    let second = app.oneshot(post_operation(Some("order-123"))).await.unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    assert_eq!(
        second
            .headers()
            .get(REPLAYED_HEADER)
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );

    // Byte-for-byte replay, random id included.
    assert_eq!(body_string(second).await, first_body);
}

#[tokio::test]
async fn test_in_flight_key_returns_conflict() {
    let (app, store) = test_app();

    // Simulate a concurrent request that entered but has not finished.
    let pending = IdempotencyRecord::pending("order-busy", "other-request");
    store
        .put("order-busy", &pending.to_bytes().unwrap(), 60)
        .await
        .unwrap();

    let response = app.oneshot(post_operation(Some("order-busy"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_string(response).await;
    assert!(body.contains("order-busy"));
    assert!(body.contains("in progress"));
}

#[tokio::test]
async fn test_corrupt_record_fails_closed() {
    let (app, store) = test_app();

    store.put("order-bad", b"garbage", 60).await.unwrap();

    let response = app.oneshot(post_operation(Some("order-bad"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(response).await;
    assert!(body.contains("IDEMPOTENCY_FILTER_FAILED"));
}

#[tokio::test]
async fn test_read_requests_pass_through_with_key() {
    let (app, store) = test_app();

    let response = app
        .oneshot(
            Request::get("/health")
                .header(IDEMPOTENCY_KEY_HEADER, "ignored-on-reads")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_gate_stats_endpoint_reflects_activity() {
    let (app, _store) = test_app();

    app.clone()
        .oneshot(post_operation(Some("order-7")))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_operation(Some("order-7")))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::get("/idempotency/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stats: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let data = &stats["data"];
    assert_eq!(data["gated_requests"], 2);
    assert_eq!(data["replays"], 1);
    assert_eq!(data["completions"], 1);
}

#[tokio::test]
async fn test_error_response_is_replayed_like_any_other() {
    let (app, _store) = test_app();

    let bad_request = |key: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/operations")
            .header(header::CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_KEY_HEADER, key)
            .body(Body::from(r#"{"name":""}"#))
            .unwrap()
    };

    let response = app.clone().oneshot(bad_request("order-bad-name")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The error body was produced, so it is cached and replayed like any
    // other handler result.
    let replay = app.oneshot(bad_request("order-bad-name")).await.unwrap();
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        replay
            .headers()
            .get(REPLAYED_HEADER)
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );
}

#[tokio::test]
async fn test_oversized_body_streams_through_uncached() {
    // The demo response is far larger than 16 bytes, so it cannot be cached.
    let (app, _store) = test_app_with_cap(16);

    let first = app
        .clone()
        .oneshot(post_operation(Some("order-big")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    assert!(first.headers().get(REPLAYED_HEADER).is_none());

    // The caller still receives the handler response unmodified.
    let body: serde_json::Value = serde_json::from_str(&body_string(first).await).unwrap();
    assert_eq!(body["success"], true);
    assert!(body["data"]["id"].is_string());

    // Nothing was cached, so the record stays pending and a retry conflicts.
    let second = app.oneshot(post_operation(Some("order-big"))).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_empty_body_leaves_record_pending() {
    let (state, store) = test_state();
    let app = Router::new()
        .route(
            "/empty",
            axum::routing::post(|| async { StatusCode::NO_CONTENT }),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            idempotency_middleware,
        ))
        .with_state(state);

    let empty_request = |key: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/empty")
            .header(IDEMPOTENCY_KEY_HEADER, key)
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(empty_request("order-empty")).await.unwrap();
    assert_eq!(first.status(), StatusCode::NO_CONTENT);

    // An empty body is not a cacheable result; the key stays held.
    assert_eq!(store.len(), 1);
    let second = app.oneshot(empty_request("order-empty")).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}
