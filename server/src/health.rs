use crate::rest::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    fn to_http_status(self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl ComponentHealth {
    fn healthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: Some(message.into()),
        }
    }

    fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: i64,
    pub components: Vec<ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub timestamp: DateTime<Utc>,
}

lazy_static::lazy_static! {
    static ref SERVER_START_TIME: DateTime<Utc> = Utc::now();
}

/// Pin the uptime origin; called once at startup
pub fn mark_started() {
    lazy_static::initialize(&SERVER_START_TIME);
}

/// Process liveness. Never touches the registry backend.
#[instrument]
pub async fn health_liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        alive: true,
        timestamp: Utc::now(),
    })
}

/// Deep check: the registry backend must answer a read
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut status = HealthStatus::Healthy;
    let backend = state.registry.store().backend_name();

    let registry = match state.registry.get_cluster_config().await {
        Ok(_) => ComponentHealth::healthy("registry", format!("{} backend reachable", backend)),
        Err(e) => {
            error!("Registry health check failed: {}", e);
            status = HealthStatus::Unhealthy;
            ComponentHealth::unhealthy("registry", e.to_string())
        }
    };

    let now = Utc::now();
    let response = HealthResponse {
        status,
        timestamp: now,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (now - *SERVER_START_TIME).num_seconds(),
        components: vec![registry],
    };

    (status.to_http_status(), Json(response))
}
