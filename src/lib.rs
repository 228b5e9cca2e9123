pub mod a1;
pub mod client;
pub mod config;
pub mod consent;
pub mod credentials;
pub mod error;
pub mod health;
pub mod logging;
pub mod model;
pub mod oauth;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod tools;

pub use config::{CliArgs, Command, ServerConfig, TransportKind};
pub use credentials::{CredentialProvider, CredentialState, CredentialStore};
pub use error::{ErrorCode, SheetsError, to_rmcp_error};
pub use logging::{LoggingConfig, init_logging};
pub use server::SheetsServer;
pub use shutdown::ShutdownCoordinator;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::get,
};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use state::AppState;
use std::{future::IntoFuture, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub const HTTP_SERVICE_PATH: &str = "/mcp";

const MCP_PROTOCOL_VERSION: HeaderName = HeaderName::from_static("mcp-protocol-version");
const MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(config.clone())?);

    let credential_state = state.credentials().state().await;
    tracing::info!(
        transport = %config.transport,
        creds_dir = %config.creds_dir.display(),
        credential_state = %credential_state,
        "starting google sheets MCP server",
    );
    if credential_state != CredentialState::Ready {
        tracing::warn!(
            credential_state = %credential_state,
            "credentials are not ready; run `google-sheets-mcp auth` to grant access"
        );
    }

    match config.transport {
        TransportKind::Stdio => {
            let server = SheetsServer::from_state(state);
            server.run_stdio().await
        }
        TransportKind::Http => run_stream_http_transport(config, state).await,
    }
}

/// Full HTTP surface: MCP endpoint, health probes and CORS.
pub fn build_http_router(state: Arc<AppState>, config: &ServerConfig) -> Result<Router> {
    let service_state = state.clone();
    let service = StreamableHttpService::new(
        move || Ok(SheetsServer::from_state(service_state.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let tools_count = SheetsServer::from_state(state.clone()).tool_count();
    let health_checker = Arc::new(health::HealthChecker::new(state, tools_count));

    let router = Router::new()
        .nest_service(HTTP_SERVICE_PATH, service)
        .route("/health", get(health::liveness_handler))
        .route("/ready", get(health::readiness_handler))
        .with_state(health_checker)
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());
    Ok(router)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .with_context(|| format!("invalid CORS origin {origin:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            MCP_PROTOCOL_VERSION,
            MCP_SESSION_ID,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
        ])
        .expose_headers([MCP_SESSION_ID]))
}

async fn run_stream_http_transport(config: Arc<ServerConfig>, state: Arc<AppState>) -> Result<()> {
    let coordinator = ShutdownCoordinator::default();
    let router = build_http_router(state, &config)?;

    let bind_addr = config.http_bind_address;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(transport = "http", bind = %actual_addr, path = HTTP_SERVICE_PATH, "listening");

    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        signal_coordinator.wait_for_signal().await;
    });

    let token = coordinator.token();
    let server_future = axum::serve(listener, router)
        .with_graceful_shutdown(token.clone().cancelled_owned())
        .into_future();
    tokio::pin!(server_future);

    // Open streaming sessions can hold the graceful shutdown forever.
    let drain_timeout = coordinator.drain_timeout();
    tokio::select! {
        result = &mut server_future => {
            result?;
        }
        _ = async {
            token.cancelled().await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            tracing::warn!(
                timeout_secs = drain_timeout.as_secs(),
                "drain timeout elapsed, closing remaining connections"
            );
        }
    }

    tracing::info!("server stopped");
    Ok(())
}
