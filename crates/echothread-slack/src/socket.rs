// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Socket Mode client.
//!
//! Workspaces that declare an app token get one persistent websocket
//! connection. Envelopes are acknowledged immediately, then translated
//! into [`Command`]s on the shared command channel, tagged with the
//! originating workspace.
//!
//! [`Command`]: echothread_core::types::Command

use echothread_core::types::Command;
use echothread_core::{ChatPoster, TeamId};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::inbound::{self, InboundEvent};
use crate::SlackClient;

/// Wait between reconnect attempts after a dropped socket.
const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Runs the Socket Mode loop for one workspace until cancelled.
///
/// Reconnects with a fixed delay whenever the websocket drops or Slack
/// sends a `disconnect` envelope.
pub async fn run(
    client: SlackClient,
    team_id: TeamId,
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
) {
    info!(team_id = %team_id, "socket mode loop starting");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match client.connections_open().await {
            Ok(url) => {
                if let Err(e) = drive_connection(&client, &team_id, &url, &tx, &cancel).await {
                    warn!(team_id = %team_id, error = %e, "socket mode connection ended");
                }
            }
            Err(e) => {
                warn!(team_id = %team_id, error = %e, "connections.open failed");
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
    info!(team_id = %team_id, "socket mode loop stopped");
}

type WsError = Box<dyn std::error::Error + Send + Sync>;

async fn drive_connection(
    client: &SlackClient,
    team_id: &TeamId,
    url: &str,
    tx: &mpsc::Sender<Command>,
    cancel: &CancellationToken,
) -> Result<(), WsError> {
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();
    debug!(team_id = %team_id, "socket mode connected");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                };
                let text = match msg {
                    Message::Text(t) => t,
                    Message::Ping(p) => {
                        sink.send(Message::Pong(p)).await?;
                        continue;
                    }
                    Message::Close(_) => return Ok(()),
                    _ => continue,
                };
                let envelope: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "unparsable socket envelope");
                        continue;
                    }
                };

                if let Some(envelope_id) = envelope["envelope_id"].as_str() {
                    let ack = json!({ "envelope_id": envelope_id }).to_string();
                    sink.send(Message::Text(ack)).await?;
                }

                match envelope["type"].as_str() {
                    Some("hello") => continue,
                    Some("disconnect") => {
                        debug!(team_id = %team_id, "server requested reconnect");
                        return Ok(());
                    }
                    _ => {}
                }

                for event in translate_envelope(team_id, &envelope) {
                    if deliver(client, team_id, tx, event).await.is_err() {
                        // Router gone: shut the connection down.
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Resolves an inbound event into a command delivery, downloading cookie
/// files on the way. `Err` means the command channel is closed.
async fn deliver(
    client: &SlackClient,
    team_id: &TeamId,
    tx: &mpsc::Sender<Command>,
    event: InboundEvent,
) -> Result<(), ()> {
    match event {
        InboundEvent::Command(cmd) => tx.send(cmd).await.map_err(|_| ()),
        InboundEvent::CookieFile {
            user,
            channel,
            url_private,
        } => match client.download_file(&url_private).await {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes).to_string();
                tx.send(Command::CookieUpload {
                    team_id: team_id.clone(),
                    user_id: user,
                    channel_id: channel,
                    content,
                })
                .await
                .map_err(|_| ())
            }
            Err(e) => {
                warn!(error = %e, "cookie file download failed");
                Ok(())
            }
        },
    }
}

/// Translates a Socket Mode envelope into zero or more inbound events.
fn translate_envelope(default_team: &TeamId, envelope: &Value) -> Vec<InboundEvent> {
    let payload = &envelope["payload"];
    match envelope["type"].as_str() {
        Some("slash_commands") => {
            let team_id = payload_team(payload, default_team);
            inbound::slash_to_command(
                team_id,
                payload["command"].as_str().unwrap_or_default(),
                payload["text"].as_str().unwrap_or_default(),
                payload["channel_id"].as_str().unwrap_or_default(),
                payload["user_id"].as_str().unwrap_or_default(),
            )
            .map(InboundEvent::Command)
            .into_iter()
            .collect()
        }
        Some("events_api") => {
            let team_id = payload_team(payload, default_team);
            inbound::message_event(&team_id, &payload["event"])
        }
        _ => Vec::new(),
    }
}

fn payload_team(payload: &Value, default_team: &TeamId) -> TeamId {
    payload["team_id"]
        .as_str()
        .or_else(|| payload["team"]["id"].as_str())
        .map(|s| TeamId(s.to_string()))
        .unwrap_or_else(|| default_team.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> TeamId {
        TeamId("T1".into())
    }

    #[test]
    fn slash_envelope_translates_with_payload_team() {
        let envelope = json!({
            "type": "slash_commands",
            "payload": {
                "command": "/youtube2thread",
                "text": "https://youtube.com/watch?v=abc",
                "channel_id": "C1",
                "user_id": "U1",
                "team_id": "T2",
            }
        });
        let events = translate_envelope(&team(), &envelope);
        assert_eq!(events.len(), 1);
        match &events[0] {
            InboundEvent::Command(Command::Start { team_id, .. }) => {
                assert_eq!(team_id.0, "T2")
            }
            _ => panic!("expected Start"),
        }
    }

    #[test]
    fn missing_payload_team_falls_back_to_connection_team() {
        let envelope = json!({
            "type": "slash_commands",
            "payload": {
                "command": "/youtube2thread-status",
                "channel_id": "C1",
                "user_id": "U1",
            }
        });
        match &translate_envelope(&team(), &envelope)[0] {
            InboundEvent::Command(Command::Status { team_id, .. }) => {
                assert_eq!(team_id.0, "T1")
            }
            _ => panic!("expected Status"),
        }
    }

    #[test]
    fn events_envelope_delegates_to_message_translation() {
        let envelope = json!({
            "type": "events_api",
            "payload": {
                "team_id": "T1",
                "event": {
                    "type": "message",
                    "user": "U1",
                    "channel": "C1",
                    "thread_ts": "111.222",
                    "text": "ストップ",
                }
            }
        });
        let events = translate_envelope(&team(), &envelope);
        assert_eq!(events.len(), 1);
        match &events[0] {
            InboundEvent::Command(Command::ThreadMessage { text, .. }) => {
                assert_eq!(text, "ストップ")
            }
            _ => panic!("expected ThreadMessage"),
        }
    }

    #[test]
    fn hello_and_unknown_envelopes_are_ignored() {
        assert!(translate_envelope(&team(), &json!({"type": "hello"})).is_empty());
        assert!(translate_envelope(&team(), &json!({"type": "interactive"})).is_empty());
    }
}
