// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers: health, slash commands, event callbacks.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use echothread_core::types::Command;
use echothread_core::{ChatPoster, TeamId};
use echothread_slack::inbound::{self, InboundEvent};
use echothread_slack::signature;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::server::GatewayState;

/// GET /health: liveness plus the active stream count.
pub async fn get_health(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "active_streams": (state.active_streams)(),
    }))
}

/// Form fields Slack sends for a slash command.
#[derive(Debug, Deserialize)]
struct SlashForm {
    command: String,
    #[serde(default)]
    text: String,
    channel_id: String,
    user_id: String,
    #[serde(default)]
    team_id: String,
}

/// Verifies the Slack signature for `team_id` over the raw body.
async fn verify_signature(
    state: &GatewayState,
    headers: &HeaderMap,
    team_id: &TeamId,
    body: &[u8],
) -> Result<(), Response> {
    let timestamp = headers
        .get("x-slack-request-timestamp")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let sig = headers
        .get("x-slack-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let Some(secret) = state.workspaces.signing_secret_for(team_id).await else {
        warn!(team_id = %team_id, "webhook for unknown workspace");
        return Err(StatusCode::UNAUTHORIZED.into_response());
    };

    signature::verify(&secret, timestamp, sig, body, chrono::Utc::now().timestamp()).map_err(
        |e| {
            warn!(team_id = %team_id, error = %e, "webhook signature rejected");
            StatusCode::UNAUTHORIZED.into_response()
        },
    )
}

/// POST /slack/commands: slash command webhook.
pub async fn post_commands(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let form: SlashForm = match serde_urlencoded::from_bytes(&body) {
        Ok(form) => form,
        Err(e) => {
            debug!(error = %e, "unparsable slash command form");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let team_id = TeamId(form.team_id.clone());
    if let Err(resp) = verify_signature(&state, &headers, &team_id, &body).await {
        return resp;
    }

    let ack = match inbound::slash_to_command(
        team_id,
        &form.command,
        &form.text,
        &form.channel_id,
        &form.user_id,
    ) {
        Some(command) => {
            let ack = ack_text(&command);
            if state.command_tx.send(command).await.is_err() {
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            ack
        }
        None => format!("Unknown command: {}", form.command),
    };

    Json(json!({ "response_type": "ephemeral", "text": ack })).into_response()
}

/// Immediate acknowledgement while the router does the real work.
fn ack_text(command: &Command) -> String {
    match command {
        Command::Start { url, .. } => {
            format!("🚀 Starting stream processing: {url}\nI'll create a thread when ready!")
        }
        Command::Stop { .. } => "🛑 Stopping…".to_string(),
        Command::Status { .. } => "Gathering status…".to_string(),
        _ => "OK".to_string(),
    }
}

/// POST /slack/events: Events API webhook, including the one-time
/// `url_verification` challenge.
pub async fn post_events(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "unparsable event payload");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    // The challenge handshake happens before any workspace is known to
    // Slack's servers, but it is still signed.
    let team_id = TeamId(
        payload["team_id"]
            .as_str()
            .unwrap_or(echothread_core::types::DEFAULT_TEAM_ID)
            .to_string(),
    );
    if let Err(resp) = verify_signature(&state, &headers, &team_id, &body).await {
        return resp;
    }

    if payload["type"].as_str() == Some("url_verification") {
        return Json(json!({ "challenge": payload["challenge"] })).into_response();
    }

    if payload["type"].as_str() == Some("event_callback") {
        for event in inbound::message_event(&team_id, &payload["event"]) {
            match event {
                InboundEvent::Command(command) => {
                    if state.command_tx.send(command).await.is_err() {
                        return StatusCode::SERVICE_UNAVAILABLE.into_response();
                    }
                }
                InboundEvent::CookieFile {
                    user,
                    channel,
                    url_private,
                } => {
                    // Download with the workspace's bot token, then hand
                    // the jar to the router as a normal upload.
                    let Some(client) = state.workspaces.get(&team_id).await else {
                        continue;
                    };
                    match client.download_file(&url_private).await {
                        Ok(bytes) => {
                            let command = Command::CookieUpload {
                                team_id: team_id.clone(),
                                user_id: user,
                                channel_id: channel,
                                content: String::from_utf8_lossy(&bytes).to_string(),
                            };
                            if state.command_tx.send(command).await.is_err() {
                                return StatusCode::SERVICE_UNAVAILABLE.into_response();
                            }
                        }
                        Err(e) => warn!(error = %e, "cookie file download failed"),
                    }
                }
            }
        }
    }

    StatusCode::OK.into_response()
}
