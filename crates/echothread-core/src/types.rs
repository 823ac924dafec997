// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types used across the echothread workspace.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel team id used by single-workspace deployments and by legacy rows
/// migrated from the pre-multiworkspace schema.
pub const DEFAULT_TEAM_ID: &str = "_default_";

/// Slack workspace (tenant) identifier, e.g. `T0123456789`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub String);

impl TeamId {
    /// The `_default_` team used when no workspaces are registered.
    pub fn default_team() -> Self {
        TeamId(DEFAULT_TEAM_ID.to_string())
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Slack user identifier, e.g. `U0123456789`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier of one live-transcription job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives a stream id from its scoping triple plus a salt that
/// distinguishes retries of the same thread.
pub fn stream_id_for(team: &TeamId, user: &UserId, thread_ts: &str, salt: &str) -> StreamId {
    let mut hasher = Sha256::new();
    hasher.update(team.0.as_bytes());
    hasher.update(b"|");
    hasher.update(user.0.as_bytes());
    hasher.update(b"|");
    hasher.update(thread_ts.as_bytes());
    hasher.update(b"|");
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{byte:02x}"));
    }
    StreamId(id)
}

/// Lifecycle state of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl StreamState {
    /// Whether the stream has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Stopped | StreamState::Failed)
    }

    /// Whether the stream counts toward the one-stream-per-user limit.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            StreamState::Pending | StreamState::Running | StreamState::Stopping
        )
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamState::Pending => "pending",
            StreamState::Running => "running",
            StreamState::Stopping => "stopping",
            StreamState::Stopped => "stopped",
            StreamState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A contiguous span of detected speech, ready for transcription.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Monotonic per-stream sequence number, from 0.
    pub seq: u64,
    /// Start of the span, in milliseconds since stream start.
    pub start_ms: u64,
    /// End of the span, exclusive.
    pub end_ms: u64,
    /// Raw 16 kHz mono PCM samples.
    pub pcm: Vec<i16>,
    /// Silence observed before this segment began, as reported by the
    /// segmenter. This is the authoritative silence signal consumed by the
    /// sentence assembler.
    pub leading_silence_ms: u64,
}

/// The result of transcribing one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    /// ISO language code detected by the engine, when known.
    pub language: Option<String>,
}

/// A user-visible unit of posted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    /// Monotonic per-stream ordinal, from 0. Sentences are posted in
    /// strictly increasing `ord`.
    pub ord: u64,
    pub text: String,
    /// Start of the earliest fragment this sentence contains.
    pub start_ms: u64,
    /// End of the latest fragment this sentence contains.
    pub end_ms: u64,
}

/// Metadata the media source learned about the stream before audio started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMetadata {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub video_id: Option<String>,
    pub is_live: bool,
}

/// What a thread's header message shows. The chat client renders this
/// into platform blocks; it is re-rendered on every state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderContent {
    pub title: Option<String>,
    pub url: String,
    pub status: String,
}

/// Location of a thread plus its header message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHandle {
    pub channel: String,
    /// Timestamp of the header message, which roots the thread.
    pub thread_ts: String,
}

/// Identity of the bot within one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub team_id: TeamId,
    pub bot_user_id: UserId,
}

/// A registered Slack workspace with decrypted credentials.
///
/// Secrets only live decrypted inside this in-memory view and the chat
/// client built from it; at rest they are sealed by the vault.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub team_id: TeamId,
    pub team_name: String,
    pub bot_token: String,
    pub signing_secret: String,
    pub app_token: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A user's stored cookie jar, decrypted.
#[derive(Debug, Clone)]
pub struct UserCookies {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub cookies: Vec<u8>,
    pub updated_at: String,
}

/// Per-user settings. Recognized keys are exposed as typed accessors;
/// unknown keys round-trip unmodified.
#[derive(Debug, Clone, Default)]
pub struct UserSettings {
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl UserSettings {
    pub fn preferred_language(&self) -> Option<&str> {
        self.settings
            .get("preferred_language")
            .and_then(|v| v.as_str())
            .filter(|s| *s != "auto")
    }

    pub fn whisper_model(&self) -> Option<&str> {
        self.settings.get("whisper_model").and_then(|v| v.as_str())
    }

    pub fn include_timestamps(&self) -> bool {
        self.settings
            .get("include_timestamps")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn allow_local_whisper(&self) -> bool {
        self.settings
            .get("allow_local_whisper")
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }
}

/// A parsed inbound command, normalized from the webhook or Socket Mode
/// surface, tagged with the originating workspace.
#[derive(Debug, Clone)]
pub enum Command {
    /// `/youtube2thread <url>`
    Start {
        team_id: TeamId,
        user_id: UserId,
        channel_id: String,
        url: String,
    },
    /// `/youtube2thread-stop [stream_id]` or a stop synonym in a thread.
    Stop {
        team_id: TeamId,
        user_id: UserId,
        channel_id: String,
        stream_id: Option<StreamId>,
    },
    /// A retry synonym posted inside a stream's thread.
    Retry {
        team_id: TeamId,
        user_id: UserId,
        channel_id: String,
        thread_ts: String,
    },
    /// `/youtube2thread-status`
    Status {
        team_id: TeamId,
        user_id: UserId,
        channel_id: String,
    },
    /// Free-form text posted inside a thread the bot owns.
    ThreadMessage {
        team_id: TeamId,
        user_id: UserId,
        channel_id: String,
        thread_ts: String,
        text: String,
    },
    /// A `cookies.txt` attachment arrived in a DM.
    CookieUpload {
        team_id: TeamId,
        user_id: UserId,
        channel_id: String,
        content: String,
    },
}

impl Command {
    /// The workspace a command belongs to.
    pub fn team_id(&self) -> &TeamId {
        match self {
            Command::Start { team_id, .. }
            | Command::Stop { team_id, .. }
            | Command::Retry { team_id, .. }
            | Command::Status { team_id, .. }
            | Command::ThreadMessage { team_id, .. }
            | Command::CookieUpload { team_id, .. } => team_id,
        }
    }
}
