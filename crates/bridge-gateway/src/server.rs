// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Router assembly and the shared [`AppState`] threaded through both the
//! `/ws` handler and the `/api/hooks/*` endpoints, mirroring the teacher's
//! pattern of one `axum::Router` per listener merging an operator WS route
//! with a small HTTP surface.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use bridge_adapter::Adapter;
use bridge_approval::ApprovalManager;
use bridge_protocol::Event;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use crate::auth::Authenticator;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::orchestrator::SessionOrchestrator;
use crate::{hooks, ws};

const MAX_HOOK_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub approvals: ApprovalManager,
    pub authenticator: Arc<dyn Authenticator>,
    /// Count of currently-authenticated WS clients, incremented/decremented
    /// by `ws::handle_socket`. The approval manager consults this to decide
    /// whether to fall through to `ask` when `require_client` is set.
    pub connected_clients: Arc<AtomicUsize>,
}

pub fn build_router(state: AppState) -> Router {
    let ws_routes = Router::new().route("/ws", get(ws::ws_handler));

    let hook_routes = Router::new()
        .route("/api/hooks/approve", post(hooks::approve))
        .route("/api/hooks/health", get(hooks::health))
        .layer(RequestBodyLimitLayer::new(MAX_HOOK_BODY_BYTES));

    ws_routes.merge(hook_routes).fallback(not_found).with_state(state)
}

async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

/// Build an [`AppState`] from a config and the set of installed adapters,
/// wiring the shared event broadcast channel between the orchestrator and
/// the approval manager exactly as `spec.md` §4.5 requires — one channel,
/// every authenticated client filters it by subscription.
pub fn build_state(
    config: &GatewayConfig,
    adapters: Vec<Arc<dyn Adapter>>,
    authenticator: Arc<dyn Authenticator>,
) -> AppState {
    let (event_tx, _) =
        tokio::sync::broadcast::channel::<Event>(bridge_adapter::EVENT_CHANNEL_CAPACITY);
    let orchestrator = Arc::new(SessionOrchestrator::new(adapters, event_tx.clone()));
    let connected_clients = Arc::new(AtomicUsize::new(0));

    let count_handle = connected_clients.clone();
    let approvals = ApprovalManager::with_timeout(
        event_tx,
        Arc::new(bridge_protocol::EventFactory::new()),
        config.approval_threshold,
        config.require_client,
        Duration::from_secs(config.approval_timeout_secs),
        move || count_handle.load(std::sync::atomic::Ordering::SeqCst),
    );

    AppState { orchestrator, approvals, authenticator, connected_clients }
}

pub async fn serve(config: &GatewayConfig, state: AppState) -> Result<(), GatewayError> {
    state.orchestrator.start().await?;

    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| GatewayError::Bind(config.bind.clone(), e))?;
    info!(bind = %config.bind, "agentbridged listening");

    let app = build_router(state.clone());
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .await
        .map_err(GatewayError::Io)?;

    state.orchestrator.shutdown().await;
    state.approvals.cleanup().await;
    Ok(())
}
