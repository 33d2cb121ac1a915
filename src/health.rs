use crate::model::now_millis;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Health status for a component or the overall system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is functioning but requests may be rejected
    Degraded,
    /// Component is not functioning
    Unhealthy,
}

impl HealthStatus {
    /// Returns the HTTP status code for this health status
    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::OK, // Still serve traffic but indicate degradation
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Combines two health statuses, returning the worse of the two
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub component: String,
    /// Health status
    pub status: HealthStatus,
    /// Optional error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Timestamp of the check, milliseconds since the epoch
    pub timestamp: i64,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    fn build(
        component: impl Into<String>,
        status: HealthStatus,
        error: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            component: component.into(),
            status,
            error,
            timestamp: now_millis(),
            details: Some(details),
        }
    }

    pub fn healthy(component: impl Into<String>, details: serde_json::Value) -> Self {
        Self::build(component, HealthStatus::Healthy, None, details)
    }

    pub fn degraded(
        component: impl Into<String>,
        error: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::build(component, HealthStatus::Degraded, Some(error.into()), details)
    }

    pub fn unhealthy(
        component: impl Into<String>,
        error: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::build(component, HealthStatus::Unhealthy, Some(error.into()), details)
    }
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: i64,
    pub version: String,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status = self.status.status_code();
        (status, Json(self)).into_response()
    }
}

/// Readiness check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Readiness status
    pub ready: bool,
    /// Overall health status
    pub status: HealthStatus,
    /// Timestamp of the check
    pub timestamp: i64,
    /// Components that are not ready
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_ready: Vec<String>,
}

impl IntoResponse for ReadinessResponse {
    fn into_response(self) -> Response {
        let status = if self.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(self)).into_response()
    }
}

/// Detailed component health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthResponse {
    pub status: HealthStatus,
    pub timestamp: i64,
    pub components: HashMap<String, ComponentHealth>,
}

impl IntoResponse for ComponentHealthResponse {
    fn into_response(self) -> Response {
        let status = self.status.status_code();
        (status, Json(self)).into_response()
    }
}

/// Runs the store and passphrase checks against the shared state.
#[derive(Clone)]
pub struct HealthChecker {
    state: Arc<AppState>,
}

impl HealthChecker {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Liveness never touches the store.
    pub fn liveness(&self) -> HealthResponse {
        HealthResponse {
            status: HealthStatus::Healthy,
            timestamp: now_millis(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Ready when the document store answers a ping.
    pub async fn readiness(&self) -> ReadinessResponse {
        let components = self.check_all_components().await;
        let mut overall = HealthStatus::Healthy;
        let mut not_ready = Vec::new();

        for (name, health) in &components {
            overall = overall.combine(health.status);
            if health.status == HealthStatus::Unhealthy {
                not_ready.push(name.clone());
            }
        }
        not_ready.sort();

        ReadinessResponse {
            ready: overall != HealthStatus::Unhealthy,
            status: overall,
            timestamp: now_millis(),
            not_ready,
        }
    }

    pub async fn components(&self) -> ComponentHealthResponse {
        let components = self.check_all_components().await;
        let overall = components
            .values()
            .fold(HealthStatus::Healthy, |acc, health| acc.combine(health.status));

        ComponentHealthResponse {
            status: overall,
            timestamp: now_millis(),
            components,
        }
    }

    async fn check_all_components(&self) -> HashMap<String, ComponentHealth> {
        let mut components = HashMap::new();
        components.insert("store".to_string(), self.check_store().await);
        components.insert("actors".to_string(), self.check_actors());
        components
    }

    async fn check_store(&self) -> ComponentHealth {
        let store = self.state.store();
        let config = self.state.config();
        let details = serde_json::json!({
            "backend": store.name(),
            "database": config.database,
            "collection": config.collection,
        });

        // The driver's own selection timeout bounds the ping; this is a backstop.
        let limit = config.connect_timeout() + Duration::from_secs(1);
        match timeout(limit, store.ping()).await {
            Ok(Ok(())) => ComponentHealth::healthy("store", details),
            Ok(Err(error)) => {
                tracing::warn!(error = %error.chain_message(), "store health check failed");
                ComponentHealth::unhealthy("store", error.to_string(), details)
            }
            Err(_) => ComponentHealth::unhealthy(
                "store",
                format!("store ping timed out after {}ms", limit.as_millis()),
                details,
            ),
        }
    }

    fn check_actors(&self) -> ComponentHealth {
        let resolver = self.state.resolver();
        let registered = resolver.registered();
        let details = serde_json::json!({
            "resolver": resolver.name(),
            "registered": registered,
        });

        if registered == 0 {
            ComponentHealth::degraded(
                "actors",
                "no passphrases registered; mutating requests will be rejected",
                details,
            )
        } else {
            ComponentHealth::healthy("actors", details)
        }
    }
}

/// Axum handler for liveness endpoint
pub async fn liveness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HealthChecker::new(state).liveness()
}

/// Axum handler for readiness endpoint
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HealthChecker::new(state).readiness().await
}

/// Axum handler for components endpoint
pub async fn components_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HealthChecker::new(state).components().await
}
