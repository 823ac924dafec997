// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-stream lifecycle and pipeline wiring.
//!
//! One [`StreamController`] owns the whole path for a stream: media reader
//! -> VAD thread -> pool submitter -> assembler/poster, plus the
//! cancellation token and the state machine
//! (pending/running/stopping/stopped/failed). Every state transition is
//! mirrored into the thread's header message; this is also the only place
//! that posts errors to the thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use echothread_core::types::{HeaderContent, ThreadHandle};
use echothread_core::{
    ChatPoster, EchoError, MediaFailureKind, MediaSource, StreamId, StreamState, TeamId, UserId,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assembler::{AssemblerConfig, SentenceAssembler};
use crate::pool::{TranscriptionFuture, TranscriptionPool};
use crate::vad::{
    EnergyClassifier, FrameClassifier, SegmenterConfig, VadEvent, VadSegmenter, WebRtcClassifier,
};

/// Engine-level tuning for one stream.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub segmenter: SegmenterConfig,
    pub assembler: AssemblerConfig,
    /// VAD aggressiveness, 0..=3.
    pub aggressiveness: u8,
    /// How long STOPPING waits for in-flight transcriptions.
    pub grace: Duration,
    /// How long a saturated pool may stall a segment before it is dropped.
    pub max_stall: Duration,
    /// How long a terminal controller stays findable for `retry`.
    pub linger: Duration,
    /// Backpressure drops within one minute that escalate to FAILED.
    pub max_drops_per_minute: usize,
    /// Consecutive per-segment failures that escalate to FAILED.
    pub max_consecutive_failures: u32,
    /// Media reader restarts within one minute before giving up.
    pub max_restarts_per_minute: usize,
    /// Prefix posted sentences with their stream offset.
    pub include_timestamps: bool,
    /// Use the RMS fallback classifier instead of webrtc-vad
    /// (deterministic; used by tests).
    pub use_energy_classifier: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            assembler: AssemblerConfig::default(),
            aggressiveness: 2,
            grace: Duration::from_secs(10),
            max_stall: Duration::from_secs(3),
            linger: Duration::from_secs(60),
            max_drops_per_minute: 3,
            max_consecutive_failures: 3,
            max_restarts_per_minute: 3,
            include_timestamps: false,
            use_energy_classifier: false,
        }
    }
}

/// Everything needed to launch one stream.
pub struct StreamSpawnArgs {
    pub stream_id: StreamId,
    pub team_id: TeamId,
    pub user_id: UserId,
    pub url: String,
    pub thread: ThreadHandle,
    pub poster: Arc<dyn ChatPoster>,
    pub media: Arc<dyn MediaSource>,
    pub pool: TranscriptionPool,
    pub cookies: Option<Vec<u8>>,
    pub language_hint: Option<String>,
    pub settings: StreamSettings,
}

/// Point-in-time view of a stream for status output.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    pub stream_id: StreamId,
    pub team_id: TeamId,
    pub user_id: UserId,
    pub url: String,
    pub thread_ts: String,
    pub state: StreamState,
    pub title: Option<String>,
    pub language: Option<String>,
    pub started_at: String,
    pub last_error: Option<String>,
}

enum StopCause {
    NaturalEnd,
    Requested,
}

enum ReaderOutcome {
    NaturalEnd,
    Cancelled,
    Fatal(EchoError),
}

enum Pending {
    Segment {
        seq: u64,
        start_ms: u64,
        end_ms: u64,
        leading_silence_ms: u64,
        rx: TranscriptionFuture,
    },
    Silence {
        duration_ms: u64,
    },
}

/// Per-stream state machine and pipeline owner.
pub struct StreamController {
    pub stream_id: StreamId,
    pub team_id: TeamId,
    pub user_id: UserId,
    pub url: String,
    pub thread: ThreadHandle,
    started_at: String,
    cancel: CancellationToken,
    state_tx: watch::Sender<StreamState>,
    state_rx: watch::Receiver<StreamState>,
    last_error: std::sync::Mutex<Option<String>>,
    title: std::sync::Mutex<Option<String>>,
    language: std::sync::Mutex<Option<String>>,
}

impl StreamController {
    /// Constructs the controller and spawns its pipeline.
    pub fn spawn(args: StreamSpawnArgs) -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(StreamState::Pending);
        let controller = Arc::new(Self {
            stream_id: args.stream_id.clone(),
            team_id: args.team_id.clone(),
            user_id: args.user_id.clone(),
            url: args.url.clone(),
            thread: args.thread.clone(),
            started_at: chrono::Utc::now().to_rfc3339(),
            cancel: CancellationToken::new(),
            state_tx,
            state_rx,
            last_error: std::sync::Mutex::new(None),
            title: std::sync::Mutex::new(None),
            language: std::sync::Mutex::new(None),
        });

        let this = controller.clone();
        tokio::spawn(async move {
            this.run(
                args.poster,
                args.media,
                args.pool,
                args.cookies,
                args.language_hint,
                args.settings,
            )
            .await;
        });
        controller
    }

    pub fn state(&self) -> StreamState {
        *self.state_rx.borrow()
    }

    /// Requests a stop; the pipeline drains within the grace window.
    pub fn stop(&self) {
        info!(stream_id = %self.stream_id, "stop requested");
        self.cancel.cancel();
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("last_error poisoned").clone()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            stream_id: self.stream_id.clone(),
            team_id: self.team_id.clone(),
            user_id: self.user_id.clone(),
            url: self.url.clone(),
            thread_ts: self.thread.thread_ts.clone(),
            state: self.state(),
            title: self.title.lock().expect("title poisoned").clone(),
            language: self.language.lock().expect("language poisoned").clone(),
            started_at: self.started_at.clone(),
            last_error: self.last_error(),
        }
    }

    /// Resolves once the stream reaches STOPPED or FAILED.
    pub async fn wait_terminal(&self) -> StreamState {
        let mut rx = self.state_rx.clone();
        loop {
            let state = *rx.borrow();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Marks the header of a superseded stream after a retry.
    pub async fn mark_retried(&self, poster: &Arc<dyn ChatPoster>) {
        let status = "🔁 Retried -- continuing in a new stream below".to_string();
        if let Err(e) = poster.edit_header(&self.thread, &self.header(status)).await {
            warn!(stream_id = %self.stream_id, error = %e, "failed to mark header retried");
        }
    }

    fn header(&self, status: String) -> HeaderContent {
        HeaderContent {
            title: self.title.lock().expect("title poisoned").clone(),
            url: self.url.clone(),
            status,
        }
    }

    fn set_state(&self, state: StreamState) {
        self.state_tx.send_replace(state);
    }

    async fn edit_status(&self, poster: &Arc<dyn ChatPoster>, status: &str) {
        if let Err(e) = poster
            .edit_header(&self.thread, &self.header(status.to_string()))
            .await
        {
            warn!(stream_id = %self.stream_id, error = %e, "header edit failed");
        }
    }

    fn running_status(&self) -> String {
        match self.language.lock().expect("language poisoned").as_deref() {
            Some(lang) => format!("🔴 Transcribing live • language: {lang}"),
            None => "🔴 Transcribing live".to_string(),
        }
    }

    async fn run(
        self: Arc<Self>,
        poster: Arc<dyn ChatPoster>,
        media: Arc<dyn MediaSource>,
        pool: TranscriptionPool,
        cookies: Option<Vec<u8>>,
        language_hint: Option<String>,
        settings: StreamSettings,
    ) {
        let outcome = self
            .pipeline(&poster, media, pool, cookies, language_hint, &settings)
            .await;

        match outcome {
            Ok(StopCause::NaturalEnd) => {
                self.set_state(StreamState::Stopped);
                self.edit_status(&poster, "✅ Stream ended").await;
                info!(stream_id = %self.stream_id, "stream ended naturally");
            }
            Ok(StopCause::Requested) => {
                self.set_state(StreamState::Stopped);
                self.edit_status(&poster, "⏸️ Stopped").await;
                info!(stream_id = %self.stream_id, "stream stopped on request");
            }
            Err(err) => {
                let (status, notice) = user_facing_failure(&err);
                *self.last_error.lock().expect("last_error poisoned") = Some(err.to_string());
                self.set_state(StreamState::Failed);
                self.edit_status(&poster, &status).await;
                if let Err(e) = poster.post_in_thread(&self.thread, &notice).await {
                    warn!(stream_id = %self.stream_id, error = %e, "failed to post error notice");
                }
                warn!(stream_id = %self.stream_id, error = %err, "stream failed");
            }
        }
    }

    async fn pipeline(
        self: &Arc<Self>,
        poster: &Arc<dyn ChatPoster>,
        media: Arc<dyn MediaSource>,
        pool: TranscriptionPool,
        cookies: Option<Vec<u8>>,
        language_hint: Option<String>,
        settings: &StreamSettings,
    ) -> Result<StopCause, EchoError> {
        let stream = media.open(&self.url, cookies.as_deref()).await?;
        {
            let metadata = stream.metadata();
            *self.title.lock().expect("title poisoned") = metadata.title.clone();
        }
        self.edit_status(poster, "⏳ Starting…").await;

        let (pcm_tx, pcm_rx) = mpsc::channel::<Vec<i16>>(32);
        let (event_tx, event_rx) = mpsc::channel::<VadEvent>(16);
        let (pending_tx, pending_rx) = mpsc::channel::<Pending>(16);

        // VAD stage: synchronous segmentation on a blocking thread. The
        // webrtc classifier is created inside the thread.
        let vad_settings = settings.clone();
        let vad_handle =
            tokio::task::spawn_blocking(move || vad_stage(vad_settings, pcm_rx, event_tx));

        // Reader stage: media frames into the VAD channel, with a restart
        // budget for flaky live sources.
        let reader_handle = tokio::spawn(reader_stage(
            self.clone(),
            poster.clone(),
            media,
            stream,
            cookies,
            pcm_tx,
            settings.max_restarts_per_minute,
        ));

        // Submitter stage: segments into the shared pool, dropping the
        // oldest pending segment when the pool stalls too long.
        let submitter_handle = tokio::spawn(submitter_stage(
            self.clone(),
            pool.clone(),
            language_hint.clone(),
            event_rx,
            pending_tx,
            settings.max_stall,
            settings.max_drops_per_minute,
        ));

        // Consumer stage runs inline: ordered results through the
        // assembler into the thread.
        let consume_result = self
            .consume_stage(poster, &pool, pending_rx, settings)
            .await;

        let _ = vad_handle.await;
        let submit_result = submitter_handle
            .await
            .unwrap_or_else(|e| Err(EchoError::Internal(format!("submitter panicked: {e}"))));
        let reader_outcome = reader_handle
            .await
            .unwrap_or(ReaderOutcome::Fatal(EchoError::Internal(
                "reader panicked".into(),
            )));

        consume_result?;
        submit_result?;
        match reader_outcome {
            ReaderOutcome::Fatal(err) => Err(err),
            ReaderOutcome::Cancelled => Ok(StopCause::Requested),
            ReaderOutcome::NaturalEnd => {
                if self.cancel.is_cancelled() {
                    Ok(StopCause::Requested)
                } else {
                    Ok(StopCause::NaturalEnd)
                }
            }
        }
    }

    /// Ordered consumption of transcription results. Returns an error only
    /// for escalations that must fail the stream.
    async fn consume_stage(
        self: &Arc<Self>,
        poster: &Arc<dyn ChatPoster>,
        pool: &TranscriptionPool,
        mut pending_rx: mpsc::Receiver<Pending>,
        settings: &StreamSettings,
    ) -> Result<(), EchoError> {
        let mut assembler = SentenceAssembler::new(settings.assembler.clone());
        let mut consecutive_failures: u32 = 0;
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                Some(d) => match tokio::time::timeout_at(d, pending_rx.recv()).await {
                    Ok(item) => item,
                    Err(_) => {
                        debug!(stream_id = %self.stream_id, "grace expired, abandoning queue");
                        break;
                    }
                },
                None => tokio::select! {
                    item = pending_rx.recv() => item,
                    _ = self.cancel.cancelled() => {
                        self.enter_stopping(poster, pool, settings, &mut deadline).await;
                        continue;
                    }
                },
            };
            let Some(item) = next else { break };

            match item {
                Pending::Silence { duration_ms } => {
                    if let Some(sentence) = assembler.report_silence(duration_ms) {
                        self.post_sentence(poster, &sentence, settings).await?;
                    }
                }
                Pending::Segment {
                    seq,
                    start_ms,
                    end_ms,
                    leading_silence_ms,
                    mut rx,
                } => {
                    let result = loop {
                        match deadline {
                            Some(d) => match tokio::time::timeout_at(d, &mut rx).await {
                                Ok(r) => break Some(r),
                                Err(_) => break None,
                            },
                            None => tokio::select! {
                                r = &mut rx => break Some(r),
                                _ = self.cancel.cancelled() => {
                                    self.enter_stopping(poster, pool, settings, &mut deadline)
                                        .await;
                                }
                            },
                        }
                    };
                    let Some(result) = result else {
                        debug!(stream_id = %self.stream_id, seq, "abandoning in-flight segment");
                        break;
                    };
                    match result {
                        Err(_) => {
                            // Sender dropped: the job was purged on stop.
                            continue;
                        }
                        Ok(Err(err)) => {
                            consecutive_failures += 1;
                            warn!(
                                stream_id = %self.stream_id,
                                seq,
                                consecutive = consecutive_failures,
                                error = %err,
                                "segment transcription failed, dropping segment"
                            );
                            if consecutive_failures >= settings.max_consecutive_failures {
                                return Err(err);
                            }
                        }
                        Ok(Ok(utterance)) => {
                            consecutive_failures = 0;
                            if utterance.text.is_empty() {
                                continue;
                            }
                            self.note_language(poster, utterance.language.as_deref()).await;
                            let sentences = assembler.push_fragment(
                                &utterance.text,
                                start_ms,
                                end_ms,
                                leading_silence_ms,
                            );
                            for sentence in sentences {
                                self.post_sentence(poster, &sentence, settings).await?;
                            }
                        }
                    }
                }
            }
        }

        // Whatever is buffered goes out, stop or not.
        if let Some(sentence) = assembler.flush() {
            self.post_sentence(poster, &sentence, settings).await?;
        }
        Ok(())
    }

    async fn enter_stopping(
        &self,
        poster: &Arc<dyn ChatPoster>,
        pool: &TranscriptionPool,
        settings: &StreamSettings,
        deadline: &mut Option<Instant>,
    ) {
        if deadline.is_some() {
            return;
        }
        self.set_state(StreamState::Stopping);
        self.edit_status(poster, "⏸️ Stopping…").await;
        pool.purge_stream(&self.stream_id);
        *deadline = Some(Instant::now() + settings.grace);
    }

    async fn note_language(&self, poster: &Arc<dyn ChatPoster>, detected: Option<&str>) {
        let Some(detected) = detected else { return };
        let is_new = {
            let mut language = self.language.lock().expect("language poisoned");
            if language.is_none() {
                *language = Some(detected.to_string());
                true
            } else {
                false
            }
        };
        if is_new {
            info!(stream_id = %self.stream_id, language = detected, "language detected");
            let status = self.running_status();
            self.edit_status(poster, &status).await;
        }
    }

    async fn post_sentence(
        &self,
        poster: &Arc<dyn ChatPoster>,
        sentence: &echothread_core::Sentence,
        settings: &StreamSettings,
    ) -> Result<(), EchoError> {
        let text = if settings.include_timestamps {
            format!("`{}` {}", format_offset(sentence.start_ms), sentence.text)
        } else {
            sentence.text.clone()
        };
        match poster.post_in_thread(&self.thread, &text).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(
                    stream_id = %self.stream_id,
                    ord = sentence.ord,
                    error = %err,
                    "sentence post failed"
                );
                Err(err)
            }
        }
    }
}

/// Blocking VAD stage body.
fn vad_stage(
    settings: StreamSettings,
    mut pcm_rx: mpsc::Receiver<Vec<i16>>,
    event_tx: mpsc::Sender<VadEvent>,
) {
    let classifier: Box<dyn FrameClassifier> = if settings.use_energy_classifier {
        Box::new(EnergyClassifier::new(settings.aggressiveness))
    } else {
        Box::new(WebRtcClassifier::new(settings.aggressiveness))
    };
    let mut segmenter = VadSegmenter::new(classifier, settings.segmenter);

    while let Some(samples) = pcm_rx.blocking_recv() {
        for event in segmenter.push(&samples) {
            if event_tx.blocking_send(event).is_err() {
                return;
            }
        }
    }
    for event in segmenter.flush() {
        if event_tx.blocking_send(event).is_err() {
            return;
        }
    }
}

/// Media reader stage: pumps PCM into the VAD channel, transitions
/// PENDING -> RUNNING on the first frame, closes the source on cancel, and
/// re-opens a flaky source within the restart budget.
async fn reader_stage(
    controller: Arc<StreamController>,
    poster: Arc<dyn ChatPoster>,
    media: Arc<dyn MediaSource>,
    mut stream: Box<dyn echothread_core::PcmStream>,
    cookies: Option<Vec<u8>>,
    pcm_tx: mpsc::Sender<Vec<i16>>,
    max_restarts_per_minute: usize,
) -> ReaderOutcome {
    let mut first_frame = true;
    let mut restarts: VecDeque<Instant> = VecDeque::new();

    let outcome = loop {
        let frame = tokio::select! {
            _ = controller.cancel.cancelled() => break ReaderOutcome::Cancelled,
            frame = stream.next_frame() => frame,
        };
        match frame {
            Ok(Some(samples)) => {
                if first_frame {
                    first_frame = false;
                    controller.set_state(StreamState::Running);
                    let status = controller.running_status();
                    controller.edit_status(&poster, &status).await;
                }
                if pcm_tx.send(samples).await.is_err() {
                    break ReaderOutcome::Cancelled;
                }
            }
            Ok(None) => break ReaderOutcome::NaturalEnd,
            Err(err) => {
                let now = Instant::now();
                restarts.push_back(now);
                while restarts
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > Duration::from_secs(60))
                {
                    restarts.pop_front();
                }
                if restarts.len() > max_restarts_per_minute {
                    break ReaderOutcome::Fatal(err);
                }
                warn!(
                    stream_id = %controller.stream_id,
                    attempt = restarts.len(),
                    error = %err,
                    "media source read failed, restarting"
                );
                stream.close().await;
                match media.open(&controller.url, cookies.as_deref()).await {
                    Ok(new_stream) => stream = new_stream,
                    Err(err) => break ReaderOutcome::Fatal(err),
                }
            }
        }
    };
    stream.close().await;
    outcome
}

/// Submitter stage: segments into the pool with the drop-oldest stall
/// policy, silence reports passed through in order.
async fn submitter_stage(
    controller: Arc<StreamController>,
    pool: TranscriptionPool,
    language_hint: Option<String>,
    mut event_rx: mpsc::Receiver<VadEvent>,
    pending_tx: mpsc::Sender<Pending>,
    max_stall: Duration,
    max_drops_per_minute: usize,
) -> Result<(), EchoError> {
    let mut drops: VecDeque<Instant> = VecDeque::new();

    while let Some(event) = event_rx.recv().await {
        match event {
            VadEvent::Silence { duration_ms } => {
                if pending_tx
                    .send(Pending::Silence { duration_ms })
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }
            VadEvent::Segment(segment) => {
                // New segments are discarded once the stream is stopping.
                if controller.cancel.is_cancelled() {
                    continue;
                }
                let submitted = pool
                    .submit_timeout(
                        &controller.stream_id,
                        segment.pcm,
                        language_hint.clone(),
                        max_stall,
                    )
                    .await?;
                match submitted {
                    Some(rx) => {
                        let pending = Pending::Segment {
                            seq: segment.seq,
                            start_ms: segment.start_ms,
                            end_ms: segment.end_ms,
                            leading_silence_ms: segment.leading_silence_ms,
                            rx,
                        };
                        if pending_tx.send(pending).await.is_err() {
                            return Ok(());
                        }
                    }
                    None => {
                        let now = Instant::now();
                        drops.push_back(now);
                        while drops
                            .front()
                            .is_some_and(|t| now.duration_since(*t) > Duration::from_secs(60))
                        {
                            drops.pop_front();
                        }
                        warn!(
                            stream_id = %controller.stream_id,
                            seq = segment.seq,
                            recent_drops = drops.len(),
                            "transcription queue saturated, dropping oldest pending segment"
                        );
                        if drops.len() > max_drops_per_minute {
                            return Err(EchoError::Transcription {
                                message: format!(
                                    "dropped {} segments in the last minute; transcription \
                                     cannot keep up with the live stream",
                                    drops.len()
                                ),
                                source: None,
                            });
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Maps a failure onto the header status line and the in-thread notice.
fn user_facing_failure(err: &EchoError) -> (String, String) {
    match err {
        EchoError::MediaStart {
            kind: MediaFailureKind::Auth,
            ..
        } => (
            "❌ Cookie authentication failed".to_string(),
            "🔒 *Cookie authentication failed*\n\
             Your YouTube cookies have expired or are invalid.\n\
             1. Log into YouTube in your browser\n\
             2. Export cookies with a browser extension\n\
             3. DM me the cookies.txt file, then type `retry` here"
                .to_string(),
        ),
        EchoError::MediaStart { kind, message } => (
            format!("❌ Failed to start ({kind})"),
            format!("❌ *Failed to access the stream* ({kind})\n{message}"),
        ),
        EchoError::Auth(message) => (
            "❌ Authentication failed".to_string(),
            format!("❌ *Authentication failed*\n{message}"),
        ),
        other => (
            "❌ Failed".to_string(),
            format!("❌ *Stream processing failed*\n{other}"),
        ),
    }
}

/// `hh:mm:ss` offset for timestamp prefixes.
fn format_offset(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_format_as_hms() {
        assert_eq!(format_offset(0), "00:00:00");
        assert_eq!(format_offset(61_500), "00:01:01");
        assert_eq!(format_offset(3_661_000), "01:01:01");
    }

    #[test]
    fn auth_failures_tell_users_to_reupload_cookies() {
        let err = EchoError::MediaStart {
            kind: MediaFailureKind::Auth,
            message: "sign in to confirm".into(),
        };
        let (status, notice) = user_facing_failure(&err);
        assert_eq!(status, "❌ Cookie authentication failed");
        assert!(notice.contains("cookies.txt"));
        assert!(notice.contains("retry"));
    }

    #[test]
    fn other_media_failures_carry_their_tag() {
        let err = EchoError::MediaStart {
            kind: MediaFailureKind::Network,
            message: "timed out".into(),
        };
        let (status, _) = user_facing_failure(&err);
        assert!(status.contains("network"));
    }
}
