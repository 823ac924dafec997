// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ffmpeg-backed PCM stream.
//!
//! One ffmpeg child per stream reads the resolved media URL and writes
//! s16le/16k/mono PCM to stdout. A reader task frames the byte stream into
//! sample blocks over a bounded channel; the channel bound is the only
//! buffer between the live source and the VAD.

use std::os::unix::fs::PermissionsExt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use echothread_core::traits::media::{MediaSource, PcmStream, SAMPLE_RATE_HZ};
use echothread_core::types::StreamMetadata;
use echothread_core::{EchoError, MediaFailureKind};
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ytdlp;

/// Samples per block handed to the pipeline (100 ms at 16 kHz).
const BLOCK_SAMPLES: usize = (SAMPLE_RATE_HZ as usize) / 10;

/// Blocks buffered between the reader task and the consumer. At 100 ms per
/// block this is ~3 s of audio, the stall ceiling before drops begin.
const CHANNEL_BLOCKS: usize = 32;

/// How long a child gets to exit after its pipe closes before SIGKILL.
const CLOSE_DEADLINE: Duration = Duration::from_secs(2);

/// Media source backed by yt-dlp resolution and an ffmpeg decode child.
pub struct YtDlpSource {
    format: String,
}

impl YtDlpSource {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new("bestaudio/best")
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn open(
        &self,
        url: &str,
        cookies: Option<&[u8]>,
    ) -> Result<Box<dyn PcmStream>, EchoError> {
        // The cookie jar goes into a 0600 temp file that lives exactly as
        // long as this stream.
        let cookie_file = match cookies {
            Some(blob) => Some(write_cookie_file(blob)?),
            None => None,
        };
        let cookie_path = cookie_file.as_ref().map(|f| f.path().to_path_buf());

        let metadata = ytdlp::probe(url, cookie_path.as_deref()).await?;
        let media_url =
            ytdlp::resolve_audio_url(url, cookie_path.as_deref(), &self.format).await?;

        let mut child = Command::new("ffmpeg")
            .arg("-i")
            .arg(&media_url)
            .args(["-f", "s16le"])
            .args(["-ar", &SAMPLE_RATE_HZ.to_string()])
            .args(["-ac", "1"])
            .args(["-acodec", "pcm_s16le"])
            .args(["-loglevel", "error"])
            .args(["-flush_packets", "1"])
            .args(["-fflags", "+nobuffer"])
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EchoError::MediaStart {
                kind: MediaFailureKind::Unavailable,
                message: format!("failed to spawn ffmpeg: {e}"),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| EchoError::MediaStart {
            kind: MediaFailureKind::Unavailable,
            message: "ffmpeg stdout unavailable".into(),
        })?;

        let (tx, rx) = mpsc::channel(CHANNEL_BLOCKS);
        let reader = tokio::spawn(read_blocks(stdout, tx));

        debug!(url, title = ?metadata.title, "media source opened");
        Ok(Box::new(FfmpegPcmStream {
            metadata,
            rx,
            child: Some(child),
            reader: Some(reader),
            _cookie_file: cookie_file,
        }))
    }
}

fn write_cookie_file(blob: &[u8]) -> Result<NamedTempFile, EchoError> {
    let file = NamedTempFile::new().map_err(|e| EchoError::MediaStart {
        kind: MediaFailureKind::Unavailable,
        message: format!("cannot create cookie temp file: {e}"),
    })?;
    std::fs::write(file.path(), blob).map_err(|e| EchoError::MediaStart {
        kind: MediaFailureKind::Unavailable,
        message: format!("cannot write cookie temp file: {e}"),
    })?;
    std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).map_err(
        |e| EchoError::MediaStart {
            kind: MediaFailureKind::Unavailable,
            message: format!("cannot restrict cookie file permissions: {e}"),
        },
    )?;
    Ok(file)
}

/// Reads ffmpeg's byte stream and emits fixed-size sample blocks.
async fn read_blocks<R: tokio::io::AsyncRead + Unpin>(
    mut stdout: R,
    tx: mpsc::Sender<Vec<i16>>,
) {
    let mut pending: Vec<u8> = Vec::with_capacity(BLOCK_SAMPLES * 4);
    let mut buf = [0u8; 4096];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break, // EOF: natural end of stream
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                while pending.len() >= BLOCK_SAMPLES * 2 {
                    let block: Vec<u8> = pending.drain(..BLOCK_SAMPLES * 2).collect();
                    if tx.send(bytes_to_samples(&block)).await.is_err() {
                        return; // consumer closed the stream
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "ffmpeg stdout read failed");
                break;
            }
        }
    }
    // A trailing partial block (< one block) is dropped; it cannot form a
    // whole VAD frame anyway.
}

fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

struct FfmpegPcmStream {
    metadata: StreamMetadata,
    rx: mpsc::Receiver<Vec<i16>>,
    child: Option<Child>,
    reader: Option<tokio::task::JoinHandle<()>>,
    /// Deleted on drop, i.e. on every exit path.
    _cookie_file: Option<NamedTempFile>,
}

#[async_trait]
impl PcmStream for FfmpegPcmStream {
    fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    async fn next_frame(&mut self) -> Result<Option<Vec<i16>>, EchoError> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) {
        // Idempotent: the child is taken on first close.
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
        self.rx.close();
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(CLOSE_DEADLINE, child.wait()).await {
                Ok(_) => debug!("ffmpeg exited within close deadline"),
                Err(_) => {
                    warn!("ffmpeg did not exit in time, killing");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }
    }
}

impl Drop for FfmpegPcmStream {
    fn drop(&mut self) {
        // kill_on_drop on the Command reaps a child that close() never saw.
        if let Some(handle) = self.reader.take() {
            handle.abort();
        }
    }
}
