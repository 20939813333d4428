use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use delayline_cluster::ClusterRegistry;
use delayline_server::{create_router, AppState};
use delayline_storage::{KeySpace, KvBackend, MemoryBackend, RegistryStore, DEFAULT_OP_TIMEOUT};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

fn test_app() -> Router {
    create_router(AppState::new(ClusterRegistry::in_memory()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_gateway_lifecycle_status_codes() {
    let app = test_app();
    let body = json!({"id": "gw-1", "address": "10.0.0.1:8081"});

    let (status, value) = send(&app, Method::POST, "/api/v1/gateways", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["success"], true);
    assert_eq!(value["data"]["status"], "Active");

    let (status, value) = send(&app, Method::POST, "/api/v1/gateways", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(value["success"], false);

    let (status, _) = send(&app, Method::PUT, "/api/v1/gateways/gw-1/heartbeat", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, "/api/v1/gateways/gw-1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/v1/gateways/gw-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::PUT, "/api/v1/gateways/gw-1/heartbeat", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_and_invalid_bodies() {
    let app = test_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/gateways")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/storages",
        Some(json!({"id": "s", "address": "redis://s", "min_delay": "soon"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/v1/nodes/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_node_ids_are_assigned_by_the_coordinator() {
    let app = test_app();

    let (status, value) = send(
        &app,
        Method::POST,
        "/api/v1/nodes",
        Some(json!({"address": "10.0.0.9:9000"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["data"]["status"], "Connecting");
    let id = value["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::PUT, &format!("/api/v1/nodes/{}/heartbeat", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, value) = send(&app, Method::GET, &format!("/api/v1/nodes/{}", id), None).await;
    assert_eq!(value["data"]["status"], "Active");

    let (_, value) = send(&app, Method::GET, "/api/v1/nodes", None).await;
    assert_eq!(value["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_storage_delays_render_as_text() {
    let app = test_app();

    let (status, value) = send(
        &app,
        Method::POST,
        "/api/v1/storages",
        Some(json!({"id": "redis", "address": "redis://r", "min_delay": "0s", "max_delay": "1h"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["data"]["max_delay"], "1h");

    send(
        &app,
        Method::POST,
        "/api/v1/storages",
        Some(json!({"id": "s3", "address": "s3://b", "min_delay": "1h"})),
    )
    .await;

    let (_, value) = send(&app, Method::GET, "/api/v1/storages/s3", None).await;
    assert_eq!(value["data"]["min_delay"], "1h");
    assert_eq!(value["data"]["max_delay"], "unlimited");

    let (_, value) = send(&app, Method::GET, "/api/v1/storages", None).await;
    let ids: Vec<&str> = value["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["redis", "s3"]);
}

#[tokio::test]
async fn test_pusher_accepts_type_alias() {
    let app = test_app();

    let (status, value) = send(
        &app,
        Method::POST,
        "/api/v1/pushers",
        Some(json!({"id": "kafka-1", "type": "kafka", "address": "k:9092"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["data"]["kind"], "kafka");
}

#[tokio::test]
async fn test_routing_rule_update_uses_path_id() {
    let app = test_app();
    let rule = json!({
        "id": "r1",
        "pattern": "orders.",
        "match_type": "prefix",
        "pusher_id": "kafka-1"
    });

    let (status, value) = send(&app, Method::POST, "/api/v1/routing-rules", Some(rule)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(value["data"]["enabled"], true);

    let update = json!({
        "id": "ignored",
        "pattern": "orders.",
        "match_type": "prefix",
        "pusher_id": "kafka-2",
        "enabled": false
    });
    let (status, value) = send(&app, Method::PUT, "/api/v1/routing-rules/r1", Some(update.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"]["id"], "r1");

    let (_, value) = send(&app, Method::GET, "/api/v1/routing-rules/r1", None).await;
    assert_eq!(value["data"]["pusher_id"], "kafka-2");
    assert_eq!(value["data"]["enabled"], false);

    let (status, _) = send(&app, Method::PUT, "/api/v1/routing-rules/missing", Some(update)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/api/v1/routing-rules/ignored", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, "/api/v1/routing-rules/r1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_config_singletons_default_when_unset() {
    let app = test_app();

    let (status, value) = send(&app, Method::GET, "/api/v1/cluster-config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"]["transport_address"], "");

    let (status, value) = send(&app, Method::GET, "/api/v1/coordinator-config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"]["backend"], "");
}

#[tokio::test]
async fn test_liveness_report() {
    let app = test_app();
    send(
        &app,
        Method::POST,
        "/api/v1/gateways",
        Some(json!({"id": "gw-1", "address": "a"})),
    )
    .await;

    let (status, value) = send(&app, Method::GET, "/api/v1/liveness?timeout=1m", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"]["timeout"], "1m");
    assert_eq!(value["data"]["gateways"]["alive"], json!(["gw-1"]));

    let (status, _) = send(&app, Method::GET, "/api/v1/liveness?timeout=later", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reflects_backend_availability() {
    let backend = Arc::new(MemoryBackend::new());
    let store = RegistryStore::new(backend.clone(), KeySpace::default(), DEFAULT_OP_TIMEOUT);
    let app = create_router(AppState::new(ClusterRegistry::new(store)));

    let (status, value) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "healthy");

    backend.set_offline(true);

    let (status, value) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(value["status"], "unhealthy");

    let (status, _) = send(&app, Method::GET, "/health/live", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/api/v1/gateways", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_corrupt_record_is_a_server_error() {
    let backend = Arc::new(MemoryBackend::new());
    let store = RegistryStore::new(backend.clone(), KeySpace::default(), DEFAULT_OP_TIMEOUT);
    let app = create_router(AppState::new(ClusterRegistry::new(store)));

    send(
        &app,
        Method::POST,
        "/api/v1/gateways",
        Some(json!({"id": "gw-ok", "address": "a"})),
    )
    .await;
    backend
        .put("/delayline/gateways/gw-bad", b"{not json".to_vec())
        .await
        .unwrap();

    let (status, value) = send(&app, Method::GET, "/api/v1/gateways/gw-bad", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(value["success"], false);

    // Lists skip the undecodable record
    let (status, value) = send(&app, Method::GET, "/api/v1/gateways", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_metrics_route_without_recorder() {
    let app = test_app();
    let (status, _) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
