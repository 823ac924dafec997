// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat poster trait: the outbound surface toward the chat platform.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EchoError;
use crate::types::{BotIdentity, HeaderContent, TeamId, ThreadHandle};

/// Abstraction over a single workspace's chat API.
///
/// Implementations must be safe to call concurrently and must serialize
/// posts within a single thread so sentences land in `ord` order.
#[async_trait]
pub trait ChatPoster: Send + Sync {
    /// Posts a header message in `channel` and returns the handle of the
    /// thread it roots.
    async fn open_thread(
        &self,
        channel: &str,
        header: &HeaderContent,
    ) -> Result<ThreadHandle, EchoError>;

    /// Posts `text` as a reply inside the thread. Returns the message ts.
    async fn post_in_thread(&self, thread: &ThreadHandle, text: &str)
        -> Result<String, EchoError>;

    /// Re-renders the thread's header message.
    async fn edit_header(
        &self,
        thread: &ThreadHandle,
        header: &HeaderContent,
    ) -> Result<(), EchoError>;

    /// Sends a short reply only the commanding user can see.
    async fn reply_ephemeral(
        &self,
        channel: &str,
        user: &str,
        text: &str,
    ) -> Result<(), EchoError>;

    /// Resolves a `#channel-name` to its id, if it exists.
    async fn resolve_channel(&self, name: &str) -> Result<Option<String>, EchoError>;

    /// Returns the bot's identity within this workspace.
    async fn whoami(&self) -> Result<BotIdentity, EchoError>;

    /// Opens (or returns) the DM channel with `user`.
    ///
    /// Default implementation fails for platforms without DMs.
    async fn open_dm(&self, _user: &str) -> Result<String, EchoError> {
        Err(EchoError::post_permanent("direct messages not supported"))
    }

    /// Downloads a platform-hosted file (e.g. an uploaded cookies.txt).
    async fn download_file(&self, _url: &str) -> Result<Vec<u8>, EchoError> {
        Err(EchoError::post_permanent("file download not supported"))
    }
}

/// Resolves a workspace to its chat poster.
///
/// Implemented by the workspace registry; the engine only sees this seam.
#[async_trait]
pub trait ChatLookup: Send + Sync {
    /// Returns the poster for `team`, or `None` when the workspace is
    /// unknown or deactivated for new work.
    async fn poster_for(&self, team: &TeamId) -> Option<Arc<dyn ChatPoster>>;
}
