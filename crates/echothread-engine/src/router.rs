// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command routing.
//!
//! Translates normalized inbound [`Command`]s (webhook or Socket Mode)
//! into registry and controller operations. Every command gets a short
//! user-visible reply; failures never escape as silent drops.

use std::sync::Arc;

use echothread_core::cookies::{filter_youtube_cookies, validate_cookie_jar};
use echothread_core::types::{stream_id_for, Command, HeaderContent};
use echothread_core::{ChatLookup, ChatPoster, EchoError, MediaSource, TeamId, UserId};
use echothread_storage::UserSecretStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::controller::{StreamController, StreamSettings, StreamSpawnArgs};
use crate::pool::TranscriptionPool;
use crate::registry::StreamRegistry;

/// Thread-message synonyms accepted for stop, matched case-insensitively
/// after trimming.
const STOP_SYNONYMS: [&str; 4] = ["stop", "halt", "停止", "ストップ"];

/// Thread-message synonyms accepted for retry.
const RETRY_SYNONYMS: [&str; 4] = ["retry", "restart", "再開", "リトライ"];

/// Shared dependencies for command handling.
pub struct RouterContext {
    pub registry: Arc<StreamRegistry>,
    pub chat: Arc<dyn ChatLookup>,
    pub media: Arc<dyn MediaSource>,
    pub pool: TranscriptionPool,
    pub users: UserSecretStore,
    pub settings: StreamSettings,
    /// Surfaced in status output.
    pub version: String,
}

/// Dispatches inbound commands until the channel closes or shutdown.
pub struct CommandRouter {
    ctx: Arc<RouterContext>,
}

impl CommandRouter {
    pub fn new(ctx: RouterContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    /// Main dispatch loop. Each command is handled on its own task so a
    /// slow start cannot delay a stop.
    pub async fn run(&self, mut rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        info!("command router started");
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                dispatch(ctx, command).await;
            });
        }
        info!("command router stopped");
    }
}

async fn dispatch(ctx: Arc<RouterContext>, command: Command) {
    let team = command.team_id().clone();
    let Some(poster) = ctx.chat.poster_for(&team).await else {
        warn!(team_id = %team, "command for unknown or inactive workspace dropped");
        return;
    };

    let (channel, user) = reply_target(&command);
    let result = handle(&ctx, &poster, command).await;
    if let Err(err) = result {
        let text = match &err {
            EchoError::Command(msg) | EchoError::Integrity(msg) => msg.clone(),
            other => format!("❌ Error processing command: {other}"),
        };
        if let Err(e) = poster.reply_ephemeral(&channel, &user, &text).await {
            warn!(error = %e, "failed to deliver command reply");
        }
    }
}

fn reply_target(command: &Command) -> (String, String) {
    match command {
        Command::Start {
            channel_id, user_id, ..
        }
        | Command::Stop {
            channel_id, user_id, ..
        }
        | Command::Retry {
            channel_id, user_id, ..
        }
        | Command::Status {
            channel_id, user_id, ..
        }
        | Command::ThreadMessage {
            channel_id, user_id, ..
        }
        | Command::CookieUpload {
            channel_id, user_id, ..
        } => (channel_id.clone(), user_id.0.clone()),
    }
}

async fn handle(
    ctx: &Arc<RouterContext>,
    poster: &Arc<dyn ChatPoster>,
    command: Command,
) -> Result<(), EchoError> {
    match command {
        Command::Start {
            team_id,
            user_id,
            channel_id,
            url,
        } => handle_start(ctx, poster, team_id, user_id, channel_id, url).await,
        Command::Stop {
            team_id,
            user_id,
            channel_id,
            stream_id,
        } => {
            let controller = match stream_id {
                Some(id) => ctx.registry.get_by_stream_id(&id),
                None => ctx.registry.active_for_user(&team_id, &user_id),
            };
            match controller.filter(|c| c.state().is_live()) {
                Some(controller) => {
                    controller.stop();
                    poster
                        .reply_ephemeral(
                            &channel_id,
                            &user_id.0,
                            &format!("🛑 Stopping stream {}", controller.stream_id),
                        )
                        .await
                }
                None => Err(EchoError::Command(
                    "no active stream to stop".into(),
                )),
            }
        }
        Command::Status {
            team_id,
            user_id,
            channel_id,
        } => {
            let text = status_text(ctx, &team_id);
            poster.reply_ephemeral(&channel_id, &user_id.0, &text).await
        }
        Command::Retry {
            team_id,
            user_id,
            channel_id,
            thread_ts,
        } => handle_retry(ctx, poster, team_id, user_id, channel_id, thread_ts).await,
        Command::ThreadMessage {
            team_id,
            user_id,
            channel_id,
            thread_ts,
            text,
        } => {
            let normalized = text.trim().to_lowercase();
            if STOP_SYNONYMS.iter().any(|s| normalized == *s) {
                match ctx
                    .registry
                    .get_by_thread(&team_id, &thread_ts)
                    .filter(|c| c.state().is_live())
                {
                    Some(controller) => {
                        controller.stop();
                        Ok(())
                    }
                    None => Err(EchoError::Command("this stream is not running".into())),
                }
            } else if RETRY_SYNONYMS.iter().any(|s| normalized == *s) {
                handle_retry(ctx, poster, team_id, user_id, channel_id, thread_ts).await
            } else {
                // Ordinary thread chatter is none of our business.
                Ok(())
            }
        }
        Command::CookieUpload {
            team_id,
            user_id,
            channel_id,
            content,
        } => {
            validate_cookie_jar(&content)?;
            let filtered = filter_youtube_cookies(&content);
            ctx.users
                .put_cookies(&team_id, &user_id, filtered.as_bytes())
                .await?;
            poster
                .reply_ephemeral(
                    &channel_id,
                    &user_id.0,
                    "✅ Cookies saved. You can now start a stream with /youtube2thread <URL>",
                )
                .await
        }
    }
}

async fn handle_start(
    ctx: &Arc<RouterContext>,
    poster: &Arc<dyn ChatPoster>,
    team_id: TeamId,
    user_id: UserId,
    channel_id: String,
    url: String,
) -> Result<(), EchoError> {
    let url = url.trim().to_string();
    if url.is_empty() {
        return Err(EchoError::Command(
            "Please provide a YouTube URL. Usage: `/youtube2thread https://youtube.com/watch?v=...`"
                .into(),
        ));
    }
    if !url.contains("youtube.com") && !url.contains("youtu.be") {
        return Err(EchoError::Command("Please provide a valid YouTube URL.".into()));
    }

    let user_settings = ctx.users.get_settings(&team_id, &user_id).await?;
    if !user_settings.allow_local_whisper() {
        return Err(EchoError::Command(
            "Local transcription is disabled in your settings.".into(),
        ));
    }

    if !ctx.users.has_cookies(&team_id, &user_id).await? {
        return Err(EchoError::Command(
            "🔒 You need to upload your YouTube cookies first!\n\n\
             Please DM me a cookies.txt file to use this feature.\n\
             Export your cookies from your browser using a browser extension."
                .into(),
        ));
    }

    // Reservation held from here until the controller is registered:
    // a second start in this window is rejected, not raced.
    let reservation = ctx.registry.reserve(&team_id, &user_id)?;

    let cookies = ctx
        .users
        .get_cookies(&team_id, &user_id)
        .await
        .map_err(|e| match e {
            EchoError::Auth(_) => EchoError::Command(
                "🔒 Your stored cookies could not be decrypted; please re-upload cookies.txt."
                    .into(),
            ),
            other => other,
        })?
        .map(|c| c.cookies);

    let _ = poster
        .reply_ephemeral(
            &channel_id,
            &user_id.0,
            &format!("🚀 Starting stream processing: {url}\nI'll create a thread when ready!"),
        )
        .await;

    let thread = poster
        .open_thread(
            &channel_id,
            &HeaderContent {
                title: None,
                url: url.clone(),
                status: "⏳ Starting…".into(),
            },
        )
        .await?;

    let stream_id = stream_id_for(&team_id, &user_id, &thread.thread_ts, "0");
    let mut settings = ctx.settings.clone();
    settings.include_timestamps =
        settings.include_timestamps || user_settings.include_timestamps();

    let controller = StreamController::spawn(StreamSpawnArgs {
        stream_id: stream_id.clone(),
        team_id,
        user_id,
        url,
        thread,
        poster: poster.clone(),
        media: ctx.media.clone(),
        pool: ctx.pool.clone(),
        cookies,
        language_hint: user_settings.preferred_language().map(str::to_string),
        settings,
    });
    ctx.registry.register(reservation, controller);
    info!(stream_id = %stream_id, "stream launched");
    Ok(())
}

async fn handle_retry(
    ctx: &Arc<RouterContext>,
    poster: &Arc<dyn ChatPoster>,
    team_id: TeamId,
    user_id: UserId,
    _channel_id: String,
    thread_ts: String,
) -> Result<(), EchoError> {
    let Some(old) = ctx.registry.get_by_thread(&team_id, &thread_ts) else {
        return Err(EchoError::Command(
            "nothing to retry here; this thread has no stream".into(),
        ));
    };
    if !old.state().is_terminal() {
        return Err(EchoError::Command(
            "this stream is still active; say `stop` first".into(),
        ));
    }

    let reservation = ctx.registry.reserve(&team_id, &user_id)?;

    // Cookies and settings are re-resolved: the usual retry reason is a
    // fresh cookie upload.
    let cookies = ctx
        .users
        .get_cookies(&team_id, &user_id)
        .await?
        .map(|c| c.cookies);
    if cookies.is_none() {
        return Err(EchoError::Command(
            "🔒 No cookies on file; DM me a cookies.txt before retrying.".into(),
        ));
    }
    let user_settings = ctx.users.get_settings(&team_id, &user_id).await?;

    old.mark_retried(poster).await;

    // A retry is a new stream in the same thread with a fresh id.
    let salt = chrono::Utc::now().timestamp_millis().to_string();
    let stream_id = stream_id_for(&team_id, &user_id, &thread_ts, &salt);
    let mut settings = ctx.settings.clone();
    settings.include_timestamps =
        settings.include_timestamps || user_settings.include_timestamps();

    let controller = StreamController::spawn(StreamSpawnArgs {
        stream_id: stream_id.clone(),
        team_id,
        user_id,
        url: old.url.clone(),
        thread: old.thread.clone(),
        poster: poster.clone(),
        media: ctx.media.clone(),
        pool: ctx.pool.clone(),
        cookies,
        language_hint: user_settings.preferred_language().map(str::to_string),
        settings,
    });
    ctx.registry.register(reservation, controller);
    info!(stream_id = %stream_id, thread_ts, "stream retried");
    Ok(())
}

fn status_text(ctx: &Arc<RouterContext>, team: &TeamId) -> String {
    let snapshots = ctx.registry.snapshots(Some(team));
    let active = snapshots.iter().filter(|s| s.state.is_live()).count();

    let mut text = format!(
        "🔧 *echothread status*\nversion: {}\nactive streams: {active}\n",
        ctx.version
    );
    if snapshots.is_empty() {
        text.push_str("no streams\n");
    }
    for snapshot in &snapshots {
        let title = snapshot.title.as_deref().unwrap_or(&snapshot.url);
        let error = snapshot
            .last_error
            .as_deref()
            .map(|e| format!(" -- {e}"))
            .unwrap_or_default();
        text.push_str(&format!(
            "• `{}` {}: {}{}\n",
            snapshot.stream_id, snapshot.state, title, error
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_synonyms_match_after_normalization() {
        for text in ["stop", "  STOP  ", "Halt", "停止", "ストップ"] {
            let normalized = text.trim().to_lowercase();
            assert!(
                STOP_SYNONYMS.iter().any(|s| normalized == *s),
                "{text} should be a stop synonym"
            );
        }
        for text in ["stopping", "please stop", "再開"] {
            let normalized = text.trim().to_lowercase();
            assert!(!STOP_SYNONYMS.iter().any(|s| normalized == *s));
        }
    }

    #[test]
    fn retry_synonyms_match() {
        for text in ["retry", "Restart", "再開", "リトライ"] {
            let normalized = text.trim().to_lowercase();
            assert!(RETRY_SYNONYMS.iter().any(|s| normalized == *s));
        }
    }
}
