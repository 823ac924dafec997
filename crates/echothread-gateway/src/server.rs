// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use echothread_core::types::Command;
use echothread_core::EchoError;
use echothread_slack::registry::WorkspaceRegistry;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::handlers;

/// Shared state for the request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Channel into the command router.
    pub command_tx: mpsc::Sender<Command>,
    /// Signing secrets and file-download clients per workspace.
    pub workspaces: Arc<WorkspaceRegistry>,
    /// Live stream count for the health endpoint.
    pub active_streams: Arc<dyn Fn() -> usize + Send + Sync>,
}

/// Builds the gateway router: a public health endpoint plus the
/// signature-verified Slack webhooks.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/slack/commands", post(handlers::post_commands))
        .route("/slack/events", post(handlers::post_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves until the process ends.
pub async fn start_server(host: &str, port: u16, state: GatewayState) -> Result<(), EchoError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| EchoError::Config(format!("failed to bind gateway to {addr}: {e}")))?;
    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| EchoError::Internal(format!("gateway server error: {e}")))
}
