//! HTTP surface for the RAG gateway.
//!
//! One POST route accepts signed chat requests and streams the downstream
//! completion back; `/healthz` reports liveness.

use anyhow::Context;
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use log::{error, info, warn};
use rag_gateway_config::{GatewayConfig, ServerConfig};
use rag_gateway_core::copilot::INTEGRATION_ID_HEADER;
use rag_gateway_core::{
    CompletionOrchestrator, CopilotClient, FailureKind, FsDocumentStore, GatewayError,
    GatewayServices, InboundRequest, RequestAuth, resolve_verifier,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;

/// Header carrying the base64 DER payload signature.
pub const SIGNATURE_HEADER: &str = "X-GitHub-Public-Key-Signature";
/// Header carrying the caller's API token.
pub const TOKEN_HEADER: &str = "X-GitHub-Token";

const RELAY_BUFFER: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<CompletionOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<CompletionOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Build the gateway router.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(&server.route, post(complete))
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .with_state(state)
}

/// Wire the production services from config.
pub async fn build_orchestrator(config: &GatewayConfig) -> anyhow::Result<CompletionOrchestrator> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.copilot.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let verifier = resolve_verifier(&config.auth, &http)
        .await
        .context("failed to load trusted public key")?;
    let copilot = Arc::new(CopilotClient::with_client(http, &config.copilot));
    let services = GatewayServices {
        documents: Arc::new(FsDocumentStore::new(config.corpus.data_dir.clone())),
        embedder: copilot.clone(),
        completions: copilot,
    };
    Ok(CompletionOrchestrator::from_config(config, verifier, services))
}

/// Serve until ctrl-c.
pub async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let orchestrator = Arc::new(build_orchestrator(&config).await?);
    let app = router(AppState::new(orchestrator), &config.server);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "rag gateway listening (addr={}, route={}, data_dir={})",
        addr,
        config.server.route,
        config.corpus.data_dir.display()
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn complete(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let inbound = InboundRequest {
        body,
        signature: header_string(&headers, SIGNATURE_HEADER),
        auth: RequestAuth::new(
            header_string(&headers, TOKEN_HEADER).unwrap_or_default(),
            header_string(&headers, INTEGRATION_ID_HEADER).unwrap_or_default(),
        ),
    };

    let prepared = match state.orchestrator.prepare(inbound).await {
        Ok(prepared) => prepared,
        Err(err) => return error_response(&err),
    };

    // The relay writes into one end of the pipe while the response body drains
    // the other; a client that goes away turns into a write error on the relay.
    let (mut writer, reader) = tokio::io::duplex(RELAY_BUFFER);
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        // failures are logged by the orchestrator
        let _ = orchestrator.relay(prepared, &mut writer).await;
    });

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn error_response(err: &GatewayError) -> Response {
    let status = match err.kind() {
        FailureKind::Unauthorized => StatusCode::UNAUTHORIZED,
        FailureKind::BadRequest => StatusCode::BAD_REQUEST,
        FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("request failed: {err}");
    } else {
        warn!("request rejected ({status}): {err}");
    }
    (status, err.public_message()).into_response()
}
