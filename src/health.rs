use crate::credentials::CredentialState;
use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SERVICE_NAME: &str = "google-sheets-mcp";

/// Liveness body for `GET /health`. Always served with 200.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    /// Seconds since the server state was built, rounded to two decimals
    pub uptime_seconds: f64,
    /// A credential source exists (env variables, token file or client secret)
    pub credentials_configured: bool,
    pub credential_state: CredentialState,
    pub tools_count: usize,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Readiness body for `GET /ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReadinessResponse {
    pub fn is_ready(&self) -> bool {
        self.reason.is_none()
    }
}

impl IntoResponse for ReadinessResponse {
    fn into_response(self) -> Response {
        let status = if self.is_ready() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    state: Arc<AppState>,
    tools_count: usize,
}

impl HealthChecker {
    pub fn new(state: Arc<AppState>, tools_count: usize) -> Self {
        Self { state, tools_count }
    }

    pub async fn liveness(&self) -> HealthResponse {
        let credentials = self.state.credentials();
        let uptime = self.state.uptime().as_secs_f64();
        HealthResponse {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: (uptime * 100.0).round() / 100.0,
            credentials_configured: credentials.store().has_material(),
            credential_state: credentials.state().await,
            tools_count: self.tools_count,
        }
    }

    /// Ready only when credentials can be produced without user interaction.
    pub async fn readiness(&self) -> ReadinessResponse {
        match self.state.credentials().get_credentials().await {
            Ok(_) => ReadinessResponse {
                status: "ready".to_string(),
                reason: None,
            },
            Err(error) => {
                tracing::debug!(error = %error, "readiness check failed");
                ReadinessResponse {
                    status: "not_ready".to_string(),
                    reason: Some(error.to_string()),
                }
            }
        }
    }
}

pub async fn liveness_handler(State(checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
    checker.liveness().await
}

pub async fn readiness_handler(State(checker): State<Arc<HealthChecker>>) -> impl IntoResponse {
    checker.readiness().await
}
