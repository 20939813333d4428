use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use delayline_cluster::api::{ApiResponse, API_PREFIX};
use delayline_common::duration::parse_delay;
use delayline_common::{BrokerError, Message, MessageId, Result as BrokerResult};
use delayline_gateway::{Gateway, GatewayConfig, RouteDecision};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Gateway error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BrokerError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BrokerError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            BrokerError::Transport { .. } | BrokerError::Unavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
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

/// Body of `POST /api/v1/message`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub routing_key: String,

    /// A JSON string is taken as raw text; any other JSON value is stored in
    /// its compact encoding.
    #[serde(default)]
    pub payload: Value,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Absolute delivery time
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Relative delivery time, e.g. `"90s"`; exclusive with `scheduled_at`
    #[serde(default)]
    pub delay: Option<String>,
}

impl MessageRequest {
    pub fn into_message(self, now: DateTime<Utc>) -> BrokerResult<Message> {
        if self.routing_key.trim().is_empty() {
            return Err(BrokerError::invalid_input("routing_key cannot be empty"));
        }

        let scheduled_at = match (self.scheduled_at, self.delay.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(BrokerError::invalid_input(
                    "set either scheduled_at or delay, not both",
                ))
            }
            (Some(at), None) => Some(at),
            (None, Some(delay)) => {
                let delay = parse_delay("delay", delay)?;
                let delay = chrono::TimeDelta::from_std(delay)
                    .map_err(|_| BrokerError::invalid_input(format!("delay out of range: {:?}", delay)))?;
                let at = now
                    .checked_add_signed(delay)
                    .ok_or_else(|| BrokerError::invalid_input("delay out of range"))?;
                Some(at)
            }
            (None, None) => None,
        };

        let payload = match self.payload {
            Value::Null => Vec::new(),
            Value::String(text) => text.into_bytes(),
            other => serde_json::to_vec(&other)?,
        };

        let mut message = Message::new(self.routing_key)
            .with_payload(payload)
            .with_metadata(self.metadata)
            .with_created_at(now);
        message.scheduled_at = scheduled_at;
        Ok(message)
    }
}

/// Acknowledgement for an accepted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: MessageId,
    pub routing_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub decision: RouteDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub status: String,
    pub gateway_id: String,
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub storages: usize,
    pub pushers: usize,
    pub rules: usize,
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Route one message. A message nothing accepts is still acknowledged; the
/// decision says it was dropped.
#[instrument(skip(state, payload))]
async fn accept_message(
    State(state): State<AppState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<MessageResponse>>), ApiError> {
    let Json(request) = payload?;
    let message = request.into_message(Utc::now())?;
    let decision = state.gateway.consume(&message).await?;

    let response = MessageResponse {
        id: message.id,
        routing_key: message.routing_key,
        scheduled_at: message.scheduled_at,
        decision,
    };
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(response))))
}

/// Ready once the first routing snapshot has been published
#[instrument(skip(state))]
async fn health(State(state): State<AppState>) -> (StatusCode, Json<GatewayHealth>) {
    let snapshot = state.gateway.snapshot();
    let ready = snapshot.generation > 0;

    let body = GatewayHealth {
        status: if ready { "ok" } else { "starting" }.to_string(),
        gateway_id: state.gateway.config().gateway_id.clone(),
        generation: snapshot.generation,
        refreshed_at: snapshot.refreshed_at,
        storages: snapshot.storages.len(),
        pushers: snapshot.pushers.len(),
        rules: snapshot.rules.len(),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[instrument(skip(state))]
async fn gateway_config(State(state): State<AppState>) -> Json<ApiResponse<GatewayConfig>> {
    Json(ApiResponse::success(state.gateway.config().clone()))
}

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
        .route("/message", post(accept_message))
        .route("/health", get(health))
        .route("/config", get(gateway_config))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest(API_PREFIX, api_routes())
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the intake server and run until `shutdown` resolves
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

    info!("Starting intake server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Intake server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &str) -> MessageRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_payload_encodings() {
        let now = Utc::now();

        let message = request(r#"{"routing_key":"k","payload":"hello"}"#)
            .into_message(now)
            .unwrap();
        assert_eq!(message.payload, b"hello".to_vec());
        assert_eq!(message.scheduled_at, None);

        let message = request(r#"{"routing_key":"k","payload":{"a":1}}"#)
            .into_message(now)
            .unwrap();
        assert_eq!(message.payload, br#"{"a":1}"#.to_vec());

        let message = request(r#"{"routing_key":"k"}"#).into_message(now).unwrap();
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_relative_delay() {
        let now = Utc::now();
        let message = request(r#"{"routing_key":"k","delay":"90s"}"#)
            .into_message(now)
            .unwrap();
        assert_eq!(message.scheduled_at, Some(now + chrono::TimeDelta::seconds(90)));
        assert_eq!(message.created_at, now);
    }

    #[test]
    fn test_invalid_requests() {
        let now = Utc::now();
        assert!(request(r#"{"routing_key":" "}"#).into_message(now).is_err());
        assert!(request(r#"{"routing_key":"k","delay":"soonish"}"#)
            .into_message(now)
            .is_err());
        assert!(request(
            r#"{"routing_key":"k","delay":"1s","scheduled_at":"2030-01-01T00:00:00Z"}"#
        )
        .into_message(now)
        .is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        let transport = ApiError(BrokerError::Transport {
            subject: "delayline.push.p".to_string(),
            message: "closed".to_string(),
        });
        assert_eq!(transport.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError(BrokerError::invalid_input("x")).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
