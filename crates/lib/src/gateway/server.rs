//! Gateway HTTP server.

use crate::buffer::{self, MessageBuffer};
use crate::config::Config;
use crate::flow::{DispatchAck, DispatchOptions, Dispatcher};
use crate::webhook::IncomingWebhook;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Shared state of the gateway; cloned into every request.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub buffer: Arc<dyn MessageBuffer>,
}

impl GatewayState {
    /// Build clients and connect the buffer for `config`.
    pub async fn from_config(config: Config) -> Result<Self> {
        let dispatcher = Dispatcher::new(&config).context("building platform client")?;
        let buffer = buffer::connect(config.buffer.redis_url.as_deref()).await;
        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            buffer,
        })
    }
}

/// Routes of the gateway.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/healthz", get(healthz))
        .route("/webhook/uazapi", post(uazapi_webhook))
        .route("/webhooks/paclead-maryjoias", post(legacy_webhook))
        .route("/webhooks/:slug", post(slug_webhook))
        .with_state(state)
}

/// Bind the configured address and serve until SIGINT/SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    if config.assistant.api_key.is_none() {
        log::warn!("gateway: no assistant api key configured; assistant calls will be rejected");
    }
    let state = GatewayState::from_config(config).await?;
    log::info!("gateway: message buffer backend {}", state.buffer.backend());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM. In-flight webhooks finish before the server returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for health checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.server.port,
        "buffer": state.buffer.backend(),
    }))
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}

/// POST /webhook/uazapi
async fn uazapi_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_webhook(&state, &headers, &body, None).await
}

/// POST /webhooks/paclead-maryjoias: fixed route kept for the first tenant's provider config.
async fn legacy_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_webhook(&state, &headers, &body, None).await
}

/// POST /webhooks/{slug}
async fn slug_webhook(
    State(state): State<GatewayState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_webhook(&state, &headers, &body, Some(slug)).await
}

async fn handle_webhook(
    state: &GatewayState,
    headers: &HeaderMap,
    body: &[u8],
    slug: Option<String>,
) -> Response {
    let incoming = match IncomingWebhook::from_slice(body) {
        Ok(w) => w,
        Err(e) => {
            log::debug!("webhook: rejecting payload: {}", e);
            return (StatusCode::BAD_REQUEST, "invalid json").into_response();
        }
    };
    let opts = DispatchOptions::from_headers(headers, slug);

    let number = incoming.sender_number();
    let text = incoming.message.content.trim();
    if !number.is_empty() && !text.is_empty() {
        let ttl = Duration::from_secs(state.config.buffer.ttl_secs);
        // Buffering never blocks the reply.
        if let Err(e) = state.buffer.push(number, text, ttl).await {
            log::warn!("webhook: buffering message from {} failed: {}", number, e);
        }
    }

    let ack = match state.dispatcher.dispatch(&incoming, &opts).await {
        Ok(ack) => ack,
        Err(e) => {
            log::error!(
                "webhook: dispatch for {} (slug={}) failed: {}",
                number,
                opts.slug.as_deref().unwrap_or("-"),
                e
            );
            DispatchAck { ok: false }
        }
    };
    (StatusCode::OK, Json(ack)).into_response()
}
