// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the echothread workspace.

use thiserror::Error;

/// Classification tag for a media source that could not begin producing audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFailureKind {
    /// Cookies expired/invalid, bot challenge, members-only content.
    Auth,
    /// The video or stream does not exist.
    NotFound,
    /// Transport-level failure reaching the media host.
    Network,
    /// The stream exists but cannot be played right now.
    Unavailable,
}

impl std::fmt::Display for MediaFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MediaFailureKind::Auth => "auth",
            MediaFailureKind::NotFound => "not_found",
            MediaFailureKind::Network => "network",
            MediaFailureKind::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Classification for a failed chat post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFailureKind {
    /// Worth retrying with backoff.
    Transient,
    /// Server asked us to slow down; holds the requested delay in seconds.
    RateLimited(Option<u64>),
    /// Retrying will not help.
    Permanent,
}

/// The primary error type used across all echothread crates.
///
/// Component boundaries translate low-level errors into these variants;
/// the stream controller is the only place that turns them into
/// user-visible thread messages.
#[derive(Debug, Error)]
pub enum EchoError {
    /// Missing or invalid startup inputs (encryption key, malformed config).
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Decryption failed or chat credentials were rejected. Non-retryable.
    #[error("authentication failure: {0}")]
    Auth(String),

    /// The media source could not begin producing audio.
    #[error("media start failure ({kind}): {message}")]
    MediaStart {
        kind: MediaFailureKind,
        message: String,
    },

    /// A single segment failed to transcribe.
    #[error("transcription error: {message}")]
    Transcription {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A chat post failed.
    #[error("post failure ({kind:?}): {message}")]
    Post {
        kind: PostFailureKind,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Malformed or unauthorized user command; the message is user-visible.
    #[error("{0}")]
    Command(String),

    /// A store invariant would be violated (e.g. duplicate stream per user).
    #[error("{0}")]
    Integrity(String),

    /// Storage backend errors (connection, query, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EchoError {
    /// Shorthand for a transient post failure.
    pub fn post_transient(message: impl Into<String>) -> Self {
        EchoError::Post {
            kind: PostFailureKind::Transient,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a permanent post failure.
    pub fn post_permanent(message: impl Into<String>) -> Self {
        EchoError::Post {
            kind: PostFailureKind::Permanent,
            message: message.into(),
            source: None,
        }
    }

    /// Whether a post retry loop should try again.
    pub fn is_retryable_post(&self) -> bool {
        matches!(
            self,
            EchoError::Post {
                kind: PostFailureKind::Transient | PostFailureKind::RateLimited(_),
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_failure_kind_display() {
        assert_eq!(MediaFailureKind::Auth.to_string(), "auth");
        assert_eq!(MediaFailureKind::NotFound.to_string(), "not_found");
        assert_eq!(MediaFailureKind::Network.to_string(), "network");
        assert_eq!(MediaFailureKind::Unavailable.to_string(), "unavailable");
    }

    #[test]
    fn retryable_post_classification() {
        assert!(EchoError::post_transient("timeout").is_retryable_post());
        assert!(EchoError::Post {
            kind: PostFailureKind::RateLimited(Some(3)),
            message: "429".into(),
            source: None,
        }
        .is_retryable_post());
        assert!(!EchoError::post_permanent("channel archived").is_retryable_post());
        assert!(!EchoError::Auth("bad token".into()).is_retryable_post());
    }

    #[test]
    fn command_errors_render_without_prefix() {
        // Command/Integrity messages go straight to users; no "error:" prefix.
        let e = EchoError::Command("please provide a URL".into());
        assert_eq!(e.to_string(), "please provide a URL");
        let e = EchoError::Integrity("you already have an active stream".into());
        assert_eq!(e.to_string(), "you already have an active stream");
    }
}
