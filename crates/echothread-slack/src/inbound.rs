// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translation of inbound Slack payloads into [`Command`]s.
//!
//! Shared by the Socket Mode client and the HTTP webhook gateway, which
//! receive the same logical payloads in different envelopes.

use echothread_core::types::Command;
use echothread_core::{StreamId, TeamId, UserId};
use serde_json::Value;
use tracing::debug;

/// A message event either becomes a command directly or names a file that
/// must be downloaded first.
pub enum InboundEvent {
    Command(Command),
    /// A `cookies.txt` upload seen in a DM.
    CookieFile {
        user: UserId,
        channel: String,
        url_private: String,
    },
}

/// Maps a slash command invocation onto a [`Command`].
pub fn slash_to_command(
    team_id: TeamId,
    command: &str,
    text: &str,
    channel_id: &str,
    user_id: &str,
) -> Option<Command> {
    let user_id = UserId(user_id.to_string());
    let channel_id = channel_id.to_string();
    let text = text.trim().to_string();
    match command {
        "/youtube2thread" => Some(Command::Start {
            team_id,
            user_id,
            channel_id,
            url: text,
        }),
        "/youtube2thread-status" => Some(Command::Status {
            team_id,
            user_id,
            channel_id,
        }),
        "/youtube2thread-stop" => Some(Command::Stop {
            team_id,
            user_id,
            channel_id,
            stream_id: (!text.is_empty()).then(|| StreamId(text)),
        }),
        other => {
            debug!(command = other, "ignoring unknown slash command");
            None
        }
    }
}

/// Translates a `message` event (Events API shape) into inbound events.
///
/// The bot's own messages and message edits carry a `bot_id` or a
/// `subtype` and are ignored to prevent loops.
pub fn message_event(team_id: &TeamId, event: &Value) -> Vec<InboundEvent> {
    if event["type"].as_str() != Some("message") {
        return Vec::new();
    }
    if event["bot_id"].is_string() || event["subtype"].is_string() {
        return Vec::new();
    }
    let user = UserId(event["user"].as_str().unwrap_or_default().to_string());
    let channel = event["channel"].as_str().unwrap_or_default().to_string();

    // cookies.txt uploads arrive as DM messages with files attached.
    if event["channel_type"].as_str() == Some("im") {
        let Some(files) = event["files"].as_array() else {
            return Vec::new();
        };
        return files
            .iter()
            .filter(|file| {
                file["name"]
                    .as_str()
                    .is_some_and(|n| n.eq_ignore_ascii_case("cookies.txt"))
            })
            .filter_map(|file| {
                file["url_private"].as_str().map(|url| InboundEvent::CookieFile {
                    user: user.clone(),
                    channel: channel.clone(),
                    url_private: url.to_string(),
                })
            })
            .collect();
    }

    // In-thread replies become ThreadMessage commands.
    if let Some(thread_ts) = event["thread_ts"].as_str() {
        let text = event["text"].as_str().unwrap_or_default().to_string();
        return vec![InboundEvent::Command(Command::ThreadMessage {
            team_id: team_id.clone(),
            user_id: user,
            channel_id: channel,
            thread_ts: thread_ts.to_string(),
            text,
        })];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn team() -> TeamId {
        TeamId("T1".into())
    }

    #[test]
    fn start_command_maps() {
        let cmd = slash_to_command(
            team(),
            "/youtube2thread",
            " https://youtu.be/abc ",
            "C1",
            "U1",
        )
        .unwrap();
        match cmd {
            Command::Start { url, .. } => assert_eq!(url, "https://youtu.be/abc"),
            _ => panic!("expected Start"),
        }
    }

    #[test]
    fn stop_command_with_and_without_id() {
        match slash_to_command(team(), "/youtube2thread-stop", "abc123", "C1", "U1").unwrap() {
            Command::Stop { stream_id, .. } => assert_eq!(stream_id.unwrap().0, "abc123"),
            _ => panic!("expected Stop"),
        }
        match slash_to_command(team(), "/youtube2thread-stop", "", "C1", "U1").unwrap() {
            Command::Stop { stream_id, .. } => assert!(stream_id.is_none()),
            _ => panic!("expected Stop"),
        }
    }

    #[test]
    fn unknown_command_is_none() {
        assert!(slash_to_command(team(), "/weather", "", "C1", "U1").is_none());
    }

    #[test]
    fn thread_reply_becomes_thread_message() {
        let event = json!({
            "type": "message",
            "user": "U1",
            "channel": "C1",
            "thread_ts": "1.2",
            "text": "retry",
        });
        let events = message_event(&team(), &event);
        assert_eq!(events.len(), 1);
        match &events[0] {
            InboundEvent::Command(Command::ThreadMessage { text, .. }) => {
                assert_eq!(text, "retry")
            }
            _ => panic!("expected ThreadMessage"),
        }
    }

    #[test]
    fn bot_and_edited_messages_are_ignored() {
        let bot = json!({"type": "message", "bot_id": "B1", "thread_ts": "1.2", "text": "x"});
        assert!(message_event(&team(), &bot).is_empty());
        let edited =
            json!({"type": "message", "subtype": "message_changed", "thread_ts": "1.2"});
        assert!(message_event(&team(), &edited).is_empty());
    }

    #[test]
    fn dm_cookie_file_is_surfaced() {
        let event = json!({
            "type": "message",
            "user": "U1",
            "channel": "D1",
            "channel_type": "im",
            "files": [
                {"name": "Cookies.TXT", "url_private": "https://files.slack.com/x"},
                {"name": "notes.md", "url_private": "https://files.slack.com/y"},
            ],
        });
        let events = message_event(&team(), &event);
        assert_eq!(events.len(), 1);
        match &events[0] {
            InboundEvent::CookieFile { url_private, .. } => {
                assert_eq!(url_private, "https://files.slack.com/x")
            }
            _ => panic!("expected CookieFile"),
        }
    }
}
