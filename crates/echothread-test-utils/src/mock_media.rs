// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock media source replaying a scripted PCM timeline.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use echothread_core::traits::media::{MediaSource, PcmStream, SAMPLE_RATE_HZ};
use echothread_core::types::StreamMetadata;
use echothread_core::{EchoError, MediaFailureKind};
use tokio::sync::Mutex;

/// Builds `duration_ms` of constant-amplitude samples. Amplitude 0 is
/// silence; ~3000 reads as speech to the energy classifier.
pub fn tone(duration_ms: u64, amplitude: i16) -> Vec<i16> {
    let samples = (SAMPLE_RATE_HZ as u64 * duration_ms / 1000) as usize;
    vec![amplitude; samples]
}

/// Mock [`MediaSource`] yielding pre-scripted sample blocks.
pub struct MockMediaSource {
    script: Mutex<Option<VecDeque<Vec<i16>>>>,
    metadata: StreamMetadata,
    fail_with: Mutex<Option<MediaFailureKind>>,
    endless: bool,
    /// Cookie blobs passed to `open`, for credential-isolation assertions.
    pub opened_with: Mutex<Vec<Option<Vec<u8>>>>,
}

impl MockMediaSource {
    pub fn new(blocks: Vec<Vec<i16>>) -> Arc<Self> {
        Self::build(blocks, false)
    }

    /// A source that keeps yielding silence after the script runs out,
    /// like a live stream that never ends on its own.
    pub fn endless(blocks: Vec<Vec<i16>>) -> Arc<Self> {
        Self::build(blocks, true)
    }

    fn build(blocks: Vec<Vec<i16>>, endless: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Some(blocks.into())),
            metadata: StreamMetadata {
                title: Some("Mock Stream".into()),
                uploader: Some("tester".into()),
                video_id: Some("mock123".into()),
                is_live: true,
            },
            fail_with: Mutex::new(None),
            endless,
            opened_with: Mutex::new(Vec::new()),
        })
    }

    /// Makes the next `open` fail with the given classification.
    pub async fn fail_next_open(&self, kind: MediaFailureKind) {
        *self.fail_with.lock().await = Some(kind);
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn open(
        &self,
        _url: &str,
        cookies: Option<&[u8]>,
    ) -> Result<Box<dyn PcmStream>, EchoError> {
        self.opened_with
            .lock()
            .await
            .push(cookies.map(|c| c.to_vec()));
        if let Some(kind) = self.fail_with.lock().await.take() {
            return Err(EchoError::MediaStart {
                kind,
                message: "scripted media failure".into(),
            });
        }
        let blocks = self
            .script
            .lock()
            .await
            .take()
            .unwrap_or_default();
        Ok(Box::new(MockPcmStream {
            metadata: self.metadata.clone(),
            blocks,
            endless: self.endless,
            closed: false,
        }))
    }
}

struct MockPcmStream {
    metadata: StreamMetadata,
    blocks: VecDeque<Vec<i16>>,
    endless: bool,
    closed: bool,
}

#[async_trait]
impl PcmStream for MockPcmStream {
    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    async fn next_frame(&mut self) -> Result<Option<Vec<i16>>, EchoError> {
        if self.closed {
            return Ok(None);
        }
        // Yield so long scripts do not starve the pipeline tasks.
        tokio::task::yield_now().await;
        match self.blocks.pop_front() {
            Some(block) => Ok(Some(block)),
            None if self.endless => {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok(Some(tone(100, 0)))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.blocks.clear();
    }
}
