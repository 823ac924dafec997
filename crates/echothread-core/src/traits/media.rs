// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media source trait: the inbound audio surface.

use async_trait::async_trait;

use crate::error::EchoError;
use crate::types::StreamMetadata;

/// Sample rate every PCM stream yields.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// On-demand audio frame producer for a URL.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Starts producing audio for `url`, authenticating with the caller's
    /// cookie jar when provided.
    ///
    /// Fails with [`EchoError::MediaStart`] carrying a classification tag
    /// when the stream cannot begin.
    async fn open(
        &self,
        url: &str,
        cookies: Option<&[u8]>,
    ) -> Result<Box<dyn PcmStream>, EchoError>;
}

/// A one-shot, forward-only stream of 16-bit little-endian mono PCM at
/// [`SAMPLE_RATE_HZ`]. Seeking is not supported.
#[async_trait]
pub trait PcmStream: Send {
    /// Metadata learned before audio started (title, liveness, …).
    fn metadata(&self) -> &StreamMetadata;

    /// Returns the next block of samples, or `None` at end of stream.
    async fn next_frame(&mut self) -> Result<Option<Vec<i16>>, EchoError>;

    /// Stops the producer. Idempotent; any child process is terminated
    /// within a bounded deadline and killed if it does not exit.
    async fn close(&mut self);
}
