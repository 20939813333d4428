use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use delayline_cluster::{ClusterRegistry, MatchType, RoutingRule};
use delayline_gateway::{ChannelTransport, Dispatched, Gateway, GatewayConfig, GatewayContext};
use delayline_ingest::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

async fn seeded_registry() -> ClusterRegistry {
    let registry = ClusterRegistry::in_memory();
    registry
        .register_storage("fast", "redis:6379", Duration::ZERO, Duration::from_secs(60))
        .await
        .unwrap();
    registry
        .register_pusher("webhook", "http", "http://hooks")
        .await
        .unwrap();
    registry
        .create_routing_rule(&RoutingRule::new("orders", "orders.", MatchType::Prefix, "webhook"))
        .await
        .unwrap();
    registry
}

async fn test_app(refresh: bool) -> (Router, mpsc::Receiver<Dispatched>) {
    let (transport, published) = ChannelTransport::new(8);
    let gateway = Arc::new(
        Gateway::new(GatewayContext::new(
            GatewayConfig::new("gw-http", "127.0.0.1:8081"),
            Arc::new(seeded_registry().await),
            Arc::new(transport),
        ))
        .unwrap(),
    );
    if refresh {
        gateway.refresh(&CancellationToken::new()).await.unwrap();
    }

    (create_router(AppState::new(gateway)), published)
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
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_delayed_message_goes_to_storage() {
    let (app, mut published) = test_app(true).await;

    let (status, value) = send(
        &app,
        Method::POST,
        "/api/v1/message",
        Some(json!({"routing_key": "orders.created", "payload": "hi", "delay": "30s"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(value["success"], true);
    assert_eq!(value["data"]["decision"]["target"], "storage");
    assert_eq!(value["data"]["decision"]["storage_id"], "fast");

    let dispatched = published.recv().await.unwrap();
    assert_eq!(dispatched.subject, "delayline.storage.fast");
    let message: Value = serde_json::from_slice(&dispatched.payload).unwrap();
    assert_eq!(message["id"], value["data"]["id"]);
    assert_eq!(message["routing_key"], "orders.created");
}

#[tokio::test]
async fn test_due_message_goes_to_pusher() {
    let (app, mut published) = test_app(true).await;

    let (status, value) = send(
        &app,
        Method::POST,
        "/api/v1/message",
        Some(json!({"routing_key": "orders.paid", "metadata": {"source": "api"}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(value["data"]["decision"]["target"], "push");
    assert_eq!(value["data"]["decision"]["pusher_id"], "webhook");
    assert_eq!(value["data"]["decision"]["rule_id"], "orders");
    assert!(value["data"].get("scheduled_at").is_none());

    assert_eq!(published.recv().await.unwrap().subject, "delayline.push.webhook");
}

#[tokio::test]
async fn test_unroutable_message_is_acknowledged_as_dropped() {
    let (app, mut published) = test_app(true).await;

    let (status, value) = send(
        &app,
        Method::POST,
        "/api/v1/message",
        Some(json!({"routing_key": "billing.paid"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(value["data"]["decision"]["target"], "dropped");
    assert!(published.try_recv().is_err());
}

#[tokio::test]
async fn test_invalid_messages_are_rejected() {
    let (app, _published) = test_app(true).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/message")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, value) = send(&app, Method::POST, "/api/v1/message", Some(json!({"routing_key": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["success"], false);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/message",
        Some(json!({"routing_key": "orders.x", "delay": "eventually"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_closed_transport_is_unavailable() {
    let (app, published) = test_app(true).await;
    drop(published);

    let (status, value) = send(
        &app,
        Method::POST,
        "/api/v1/message",
        Some(json!({"routing_key": "orders.paid"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(value["success"], false);
}

#[tokio::test]
async fn test_health_waits_for_first_snapshot() {
    let (app, _published) = test_app(false).await;
    let (status, value) = send(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(value["status"], "starting");
    assert_eq!(value["generation"], 0);

    let (app, _published) = test_app(true).await;
    let (status, value) = send(&app, Method::GET, "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["status"], "ok");
    assert_eq!(value["gateway_id"], "gw-http");
    assert_eq!(value["storages"], 1);
    assert_eq!(value["rules"], 1);
}

#[tokio::test]
async fn test_config_endpoint() {
    let (app, _published) = test_app(true).await;
    let (status, value) = send(&app, Method::GET, "/api/v1/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"]["gateway_id"], "gw-http");
    assert_eq!(value["data"]["immediate_dispatch_threshold"], "10ms");

    let (status, _) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
