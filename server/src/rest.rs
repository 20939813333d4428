use crate::health;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use delayline_cluster::api::*;
use delayline_cluster::*;
use delayline_common::duration::parse_delay;
use delayline_common::BrokerError;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Registry error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BrokerError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BrokerError::NotFound { .. } => StatusCode::NOT_FOUND,
            BrokerError::AlreadyExists { .. } => StatusCode::CONFLICT,
            BrokerError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(BrokerError::invalid_input(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self.0);
        }

        (status, Json(ApiResponse::<()>::error(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;
type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

fn created<T: Serialize>(data: T) -> CreatedResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::success(data))))
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: ClusterRegistry,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(registry: ClusterRegistry) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

// ==================== Nodes ====================

#[instrument(skip(state))]
async fn create_node(
    State(state): State<AppState>,
    payload: Result<Json<CreateNodeRequest>, JsonRejection>,
) -> CreatedResult<ClusterNode> {
    let Json(request) = payload?;
    created(state.registry.create_node(&request.address).await?)
}

#[instrument(skip(state))]
async fn list_nodes(State(state): State<AppState>) -> ApiResult<Vec<ClusterNode>> {
    ok(state.registry.list_nodes().await?)
}

#[instrument(skip(state))]
async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<ClusterNode> {
    let node_id = NodeId::parse(&id)?;
    ok(state.registry.get_node(&node_id).await?)
}

#[instrument(skip(state))]
async fn node_heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let node_id = NodeId::parse(&id)?;
    state.registry.update_node_heartbeat(&node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let node_id = NodeId::parse(&id)?;
    state.registry.delete_node(&node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Gateways ====================

#[instrument(skip(state))]
async fn register_gateway(
    State(state): State<AppState>,
    payload: Result<Json<RegisterGatewayRequest>, JsonRejection>,
) -> CreatedResult<GatewayInfo> {
    let Json(request) = payload?;
    created(
        state
            .registry
            .register_gateway(&request.id, &request.address)
            .await?,
    )
}

#[instrument(skip(state))]
async fn list_gateways(State(state): State<AppState>) -> ApiResult<Vec<GatewayInfo>> {
    ok(state.registry.list_gateways().await?)
}

#[instrument(skip(state))]
async fn get_gateway(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<GatewayInfo> {
    ok(state.registry.get_gateway(&id).await?)
}

#[instrument(skip(state))]
async fn gateway_heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.update_gateway_heartbeat(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn unregister_gateway(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.unregister_gateway(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Storages ====================

#[instrument(skip(state))]
async fn register_storage(
    State(state): State<AppState>,
    payload: Result<Json<RegisterStorageRequest>, JsonRejection>,
) -> CreatedResult<StorageResponse> {
    let Json(request) = payload?;
    let (min_delay, max_delay) = request.delays()?;

    let storage = state
        .registry
        .register_storage(&request.id, &request.address, min_delay, max_delay)
        .await?;
    created(StorageResponse::from(&storage))
}

#[instrument(skip(state))]
async fn list_storages(State(state): State<AppState>) -> ApiResult<Vec<StorageResponse>> {
    let storages = state.registry.list_storages().await?;
    ok(storages.iter().map(StorageResponse::from).collect())
}

#[instrument(skip(state))]
async fn get_storage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StorageResponse> {
    let storage = state.registry.get_storage(&id).await?;
    ok(StorageResponse::from(&storage))
}

#[instrument(skip(state))]
async fn storage_heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.update_storage_heartbeat(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn unregister_storage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.unregister_storage(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Pushers ====================

#[instrument(skip(state))]
async fn register_pusher(
    State(state): State<AppState>,
    payload: Result<Json<RegisterPusherRequest>, JsonRejection>,
) -> CreatedResult<PusherInfo> {
    let Json(request) = payload?;
    created(
        state
            .registry
            .register_pusher(&request.id, &request.kind, &request.address)
            .await?,
    )
}

#[instrument(skip(state))]
async fn list_pushers(State(state): State<AppState>) -> ApiResult<Vec<PusherInfo>> {
    ok(state.registry.list_pushers().await?)
}

#[instrument(skip(state))]
async fn get_pusher(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PusherInfo> {
    ok(state.registry.get_pusher(&id).await?)
}

#[instrument(skip(state))]
async fn pusher_heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.update_pusher_heartbeat(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
async fn unregister_pusher(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.unregister_pusher(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Routing rules ====================

#[instrument(skip(state))]
async fn create_routing_rule(
    State(state): State<AppState>,
    payload: Result<Json<RoutingRule>, JsonRejection>,
) -> CreatedResult<RoutingRule> {
    let Json(rule) = payload?;
    state.registry.create_routing_rule(&rule).await?;
    created(rule)
}

#[instrument(skip(state))]
async fn list_routing_rules(State(state): State<AppState>) -> ApiResult<Vec<RoutingRule>> {
    ok(state.registry.list_routing_rules().await?)
}

#[instrument(skip(state))]
async fn get_routing_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RoutingRule> {
    ok(state.registry.get_routing_rule(&id).await?)
}

/// The path id is authoritative; an id in the body is ignored
#[instrument(skip(state))]
async fn update_routing_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RoutingRule>, JsonRejection>,
) -> ApiResult<RoutingRule> {
    let Json(mut rule) = payload?;
    rule.id = id;
    state.registry.update_routing_rule(&rule).await?;
    ok(rule)
}

#[instrument(skip(state))]
async fn delete_routing_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.delete_routing_rule(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Configuration ====================

#[instrument(skip(state))]
async fn get_cluster_config(State(state): State<AppState>) -> ApiResult<ClusterConfig> {
    ok(state.registry.get_cluster_config().await?)
}

#[instrument(skip(state))]
async fn get_coordinator_config(State(state): State<AppState>) -> ApiResult<CoordinatorConfig> {
    ok(state.registry.get_coordinator_config().await?)
}

// ==================== Liveness ====================

#[derive(Debug, Deserialize)]
struct LivenessParams {
    timeout: Option<String>,
}

const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(30);

#[instrument(skip(state))]
async fn liveness_report(
    State(state): State<AppState>,
    Query(params): Query<LivenessParams>,
) -> ApiResult<LivenessReport> {
    let timeout = match params.timeout.as_deref() {
        Some(raw) => parse_delay("timeout", raw)?,
        None => DEFAULT_LIVENESS_TIMEOUT,
    };
    ok(state.registry.liveness_report(timeout).await?)
}

// ==================== Metrics ====================

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Coordinator nodes
        .route("/nodes", post(create_node))
        .route("/nodes", get(list_nodes))
        .route("/nodes/:id", get(get_node))
        .route("/nodes/:id", delete(delete_node))
        .route("/nodes/:id/heartbeat", put(node_heartbeat))
        // Gateways
        .route("/gateways", post(register_gateway))
        .route("/gateways", get(list_gateways))
        .route("/gateways/:id", get(get_gateway))
        .route("/gateways/:id", delete(unregister_gateway))
        .route("/gateways/:id/heartbeat", put(gateway_heartbeat))
        // Storages
        .route("/storages", post(register_storage))
        .route("/storages", get(list_storages))
        .route("/storages/:id", get(get_storage))
        .route("/storages/:id", delete(unregister_storage))
        .route("/storages/:id/heartbeat", put(storage_heartbeat))
        // Pushers
        .route("/pushers", post(register_pusher))
        .route("/pushers", get(list_pushers))
        .route("/pushers/:id", get(get_pusher))
        .route("/pushers/:id", delete(unregister_pusher))
        .route("/pushers/:id/heartbeat", put(pusher_heartbeat))
        // Routing rules
        .route("/routing-rules", post(create_routing_rule))
        .route("/routing-rules", get(list_routing_rules))
        .route("/routing-rules/:id", get(get_routing_rule))
        .route("/routing-rules/:id", put(update_routing_rule))
        .route("/routing-rules/:id", delete(delete_routing_rule))
        // Configuration singletons
        .route("/cluster-config", get(get_cluster_config))
        .route("/coordinator-config", get(get_coordinator_config))
        // Liveness
        .route("/liveness", get(liveness_report))
}

/// Create REST API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest(API_PREFIX, api_routes())
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::health_liveness))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the REST server and run until `shutdown` resolves
pub async fn start_rest_server<F>(
    addr: SocketAddr,
    state: AppState,
    request_timeout: Duration,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state).layer(TimeoutLayer::new(request_timeout));

    info!("Starting REST server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("REST server stopped");
    Ok(())
}
