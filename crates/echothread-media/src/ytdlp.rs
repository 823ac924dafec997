// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! yt-dlp invocation: stream probing and audio URL resolution.

use std::path::Path;
use std::process::Stdio;

use echothread_core::types::StreamMetadata;
use echothread_core::{EchoError, MediaFailureKind};
use tokio::process::Command;
use tracing::debug;

/// stderr fragments that indicate the viewer needs (fresh) cookies.
const AUTH_PATTERNS: [&str; 12] = [
    "sign in to confirm you're not a bot",
    "confirm you're not a bot",
    "this helps protect our community",
    "requires authentication",
    "private video",
    "members-only content",
    "premium members",
    "restricted to paid members",
    "http error 403",
    "forbidden",
    "age-restricted",
    "please sign in",
];

const NOT_FOUND_PATTERNS: [&str; 4] = [
    "http error 404",
    "video unavailable",
    "does not exist",
    "this channel does not have",
];

const NETWORK_PATTERNS: [&str; 5] = [
    "unable to download webpage",
    "timed out",
    "connection refused",
    "temporary failure in name resolution",
    "network is unreachable",
];

/// Classifies a yt-dlp failure message into a remediation category.
pub fn classify_failure(stderr: &str) -> MediaFailureKind {
    let lower = stderr.to_lowercase();
    if AUTH_PATTERNS.iter().any(|p| lower.contains(p)) {
        MediaFailureKind::Auth
    } else if NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p)) {
        MediaFailureKind::NotFound
    } else if NETWORK_PATTERNS.iter().any(|p| lower.contains(p)) {
        MediaFailureKind::Network
    } else {
        MediaFailureKind::Unavailable
    }
}

fn base_command(url: &str, cookies_file: Option<&Path>) -> Command {
    let mut cmd = Command::new("yt-dlp");
    cmd.arg("--quiet")
        .arg("--no-warnings")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = cookies_file {
        cmd.arg("--cookies").arg(path);
    }
    cmd.arg("--").arg(url);
    cmd
}

async fn run(mut cmd: Command, what: &str) -> Result<String, EchoError> {
    let output = cmd.output().await.map_err(|e| EchoError::MediaStart {
        kind: MediaFailureKind::Unavailable,
        message: format!("failed to spawn yt-dlp for {what}: {e}"),
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EchoError::MediaStart {
            kind: classify_failure(&stderr),
            message: format!("yt-dlp {what} failed: {}", stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Probes the stream for title and liveness without downloading.
pub async fn probe(url: &str, cookies_file: Option<&Path>) -> Result<StreamMetadata, EchoError> {
    let mut cmd = base_command(url, cookies_file);
    cmd.arg("--dump-json").arg("--skip-download");
    let stdout = run(cmd, "probe").await?;

    let info: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(|e| EchoError::MediaStart {
            kind: MediaFailureKind::Unavailable,
            message: format!("yt-dlp probe returned unparsable JSON: {e}"),
        })?;
    let metadata = StreamMetadata {
        title: info["title"].as_str().map(str::to_string),
        uploader: info["uploader"].as_str().map(str::to_string),
        video_id: info["id"].as_str().map(str::to_string),
        is_live: info["is_live"].as_bool().unwrap_or(false),
    };
    debug!(title = ?metadata.title, is_live = metadata.is_live, "stream probed");
    Ok(metadata)
}

/// Resolves the direct media URL ffmpeg should read.
pub async fn resolve_audio_url(
    url: &str,
    cookies_file: Option<&Path>,
    format: &str,
) -> Result<String, EchoError> {
    let mut cmd = base_command(url, cookies_file);
    cmd.arg("--get-url").arg("--format").arg(format);
    let stdout = run(cmd, "url resolution").await?;

    stdout
        .lines()
        .next()
        .map(str::to_string)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| EchoError::MediaStart {
            kind: MediaFailureKind::Unavailable,
            message: "yt-dlp resolved no media URL".into(),
        })
}
