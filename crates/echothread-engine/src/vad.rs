// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice-activity segmentation.
//!
//! [`VadSegmenter`] consumes arbitrary-length PCM slices, frames them at a
//! fixed duration, classifies each frame, and emits contiguous speech
//! segments with exact millisecond boundaries and a monotonically
//! increasing `seq`. It is a synchronous state machine; the pipeline runs
//! it on a blocking thread fed by a bounded channel.

use echothread_core::types::Segment;
use echothread_core::SAMPLE_RATE_HZ;
use tracing::{debug, trace};

/// Per-frame speech/silence decision.
///
/// `Send` so the segmenter can live on a pipeline thread.
pub trait FrameClassifier: Send {
    fn is_speech(&mut self, frame: &[i16]) -> bool;
}

/// webrtc-vad classifier. Aggressiveness 0..=3, higher rejects more
/// non-speech.
pub struct WebRtcClassifier {
    vad: webrtc_vad::Vad,
}

impl WebRtcClassifier {
    pub fn new(aggressiveness: u8) -> Self {
        use webrtc_vad::{SampleRate, Vad, VadMode};
        let mode = match aggressiveness {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            _ => VadMode::VeryAggressive,
        };
        Self {
            vad: Vad::new_with_rate_and_mode(SampleRate::Rate16kHz, mode),
        }
    }
}

// SAFETY: the underlying fvad state has no thread affinity; it is only
// ever touched through &mut self, never concurrently.
unsafe impl Send for WebRtcClassifier {}

impl FrameClassifier for WebRtcClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        self.vad.is_voice_segment(frame).unwrap_or(false)
    }
}

/// RMS-threshold classifier, the fallback when webrtc-vad cannot run and
/// the deterministic choice for tests.
pub struct EnergyClassifier {
    threshold: f64,
}

impl EnergyClassifier {
    pub fn new(aggressiveness: u8) -> Self {
        let threshold = match aggressiveness {
            0 => 250.0,
            1 => 400.0,
            2 => 500.0,
            _ => 700.0,
        };
        Self { threshold }
    }
}

impl FrameClassifier for EnergyClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let sum_squares: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / frame.len() as f64).sqrt() > self.threshold
    }
}

/// Segmentation tuning.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Frame duration in ms; 10, 20, or 30.
    pub frame_ms: u32,
    /// Silent frames required before a new segment may begin.
    pub pre_pad_frames: u32,
    /// Consecutive silent frames that end a segment.
    pub post_pad_frames: u32,
    /// Segments shorter than this are absorbed or dropped.
    pub min_segment_ms: u64,
    /// Segments are force-cut at this length.
    pub max_segment_ms: u64,
    /// Idle silence that triggers a [`VadEvent::Silence`] report.
    pub silence_report_ms: u64,
    /// A short burst is absorbed into the next segment only if the next
    /// onset comes within this gap; otherwise it is dropped as isolated.
    pub carry_gap_ms: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            frame_ms: 30,
            pre_pad_frames: 5,
            post_pad_frames: 10,
            min_segment_ms: 300,
            max_segment_ms: 20_000,
            silence_report_ms: 1500,
            carry_gap_ms: 1000,
        }
    }
}

/// What the segmenter emits.
#[derive(Debug)]
pub enum VadEvent {
    Segment(Segment),
    /// The idle silence run crossed the report threshold. Consumed by the
    /// sentence assembler as its authoritative flush signal.
    Silence { duration_ms: u64 },
}

/// A speech burst below the minimum length, held to be absorbed into the
/// next segment.
struct Carry {
    start_ms: u64,
    end_ms: u64,
    pcm: Vec<i16>,
}

impl FrameClassifier for Box<dyn FrameClassifier> {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        (**self).is_speech(frame)
    }
}

/// Frame-level segmentation state machine.
pub struct VadSegmenter<C: FrameClassifier> {
    classifier: C,
    config: SegmenterConfig,
    frame_samples: usize,
    frame_ms: u64,

    pending: Vec<i16>,
    clock_ms: u64,

    in_speech: bool,
    speech_start_ms: u64,
    speech_buf: Vec<i16>,
    trailing_silence_frames: u32,

    silence_run_frames: u32,
    silence_reported: bool,
    /// The current segment began at a force-cut, continuing earlier
    /// speech; the minimum-length rule does not apply to it.
    continuation: bool,

    carry: Option<Carry>,
    last_emitted_end_ms: u64,
    seq: u64,
}

impl<C: FrameClassifier> VadSegmenter<C> {
    pub fn new(classifier: C, config: SegmenterConfig) -> Self {
        let frame_samples = (SAMPLE_RATE_HZ as usize * config.frame_ms as usize) / 1000;
        let frame_ms = config.frame_ms as u64;
        Self {
            classifier,
            // Stream start counts as armed: speech in the first frame
            // begins a segment immediately.
            silence_run_frames: config.pre_pad_frames,
            config,
            frame_samples,
            frame_ms,
            pending: Vec::new(),
            clock_ms: 0,
            in_speech: false,
            speech_start_ms: 0,
            speech_buf: Vec::new(),
            trailing_silence_frames: 0,
            silence_reported: false,
            continuation: false,
            carry: None,
            last_emitted_end_ms: 0,
            seq: 0,
        }
    }

    /// Feeds samples; returns any events they complete.
    pub fn push(&mut self, samples: &[i16]) -> Vec<VadEvent> {
        self.pending.extend_from_slice(samples);
        let mut events = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let frame: Vec<i16> = self.pending.drain(..self.frame_samples).collect();
            self.process_frame(&frame, &mut events);
        }
        events
    }

    /// End of stream: emits the in-progress segment when long enough and
    /// drops any carried burst.
    pub fn flush(&mut self) -> Vec<VadEvent> {
        let mut events = Vec::new();
        if self.in_speech {
            self.finish_segment(&mut events);
        }
        if self.carry.take().is_some() {
            debug!("dropping isolated short burst at end of stream");
        }
        events
    }

    fn process_frame(&mut self, frame: &[i16], events: &mut Vec<VadEvent>) {
        let is_speech = self.classifier.is_speech(frame);
        let frame_start = self.clock_ms;
        self.clock_ms += self.frame_ms;

        if self.in_speech {
            if is_speech {
                self.trailing_silence_frames = 0;
                // Force-cut: the next segment begins at this frame with no
                // silence gap.
                if self.speech_ms() + self.frame_ms > self.config.max_segment_ms {
                    self.finish_segment(events);
                    self.begin_segment(frame_start, true);
                }
                self.speech_buf.extend_from_slice(frame);
            } else {
                self.trailing_silence_frames += 1;
                self.speech_buf.extend_from_slice(frame);
                if self.trailing_silence_frames >= self.config.post_pad_frames {
                    self.finish_segment(events);
                }
            }
        } else if is_speech {
            if self.silence_run_frames < self.config.pre_pad_frames {
                trace!(
                    silence_frames = self.silence_run_frames,
                    "speech onset before pre-pad elapsed"
                );
            }
            self.begin_segment(frame_start, false);
            self.speech_buf.extend_from_slice(frame);
        } else {
            self.silence_run_frames += 1;
            let silence_ms = self.silence_run_frames as u64 * self.frame_ms;
            if !self.silence_reported && silence_ms >= self.config.silence_report_ms {
                self.silence_reported = true;
                events.push(VadEvent::Silence {
                    duration_ms: silence_ms,
                });
            }
        }
    }

    fn begin_segment(&mut self, start_ms: u64, continuation: bool) {
        self.in_speech = true;
        self.continuation = continuation;
        self.speech_start_ms = start_ms;
        self.speech_buf.clear();
        self.trailing_silence_frames = 0;
        self.silence_reported = false;

        // Absorb a recent short burst; a stale one is isolated and dropped.
        if let Some(carry) = self.carry.take() {
            if start_ms.saturating_sub(carry.end_ms) <= self.config.carry_gap_ms {
                self.speech_start_ms = carry.start_ms;
                self.speech_buf = carry.pcm;
            } else {
                debug!(
                    gap_ms = start_ms - carry.end_ms,
                    "dropping isolated short burst"
                );
            }
        }
    }

    fn speech_ms(&self) -> u64 {
        (self.speech_buf.len() / self.frame_samples) as u64 * self.frame_ms
    }

    fn finish_segment(&mut self, events: &mut Vec<VadEvent>) {
        self.in_speech = false;

        // Trailing silence is not part of the segment.
        let trim = self.trailing_silence_frames as usize * self.frame_samples;
        let keep = self.speech_buf.len().saturating_sub(trim);
        self.speech_buf.truncate(keep);

        // The trimmed frames seed the next silence run.
        self.silence_run_frames = self.trailing_silence_frames;
        self.trailing_silence_frames = 0;

        let duration_ms = self.speech_ms();
        let start_ms = self.speech_start_ms;
        let end_ms = start_ms + duration_ms;
        let pcm = std::mem::take(&mut self.speech_buf);

        if duration_ms == 0 {
            return;
        }
        if duration_ms < self.config.min_segment_ms && !self.continuation {
            trace!(duration_ms, "holding short burst for absorption");
            self.carry = Some(Carry {
                start_ms,
                end_ms,
                pcm,
            });
            return;
        }

        let leading_silence_ms = start_ms.saturating_sub(self.last_emitted_end_ms);
        self.last_emitted_end_ms = end_ms;
        let seq = self.seq;
        self.seq += 1;

        events.push(VadEvent::Segment(Segment {
            seq,
            start_ms,
            end_ms,
            pcm,
            leading_silence_ms,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classifier driven by a scripted per-frame decision list.
    struct Scripted {
        decisions: Vec<bool>,
        index: usize,
    }

    impl Scripted {
        fn new(decisions: Vec<bool>) -> Self {
            Self {
                decisions,
                index: 0,
            }
        }
    }

    impl FrameClassifier for Scripted {
        fn is_speech(&mut self, _frame: &[i16]) -> bool {
            let decision = self.decisions.get(self.index).copied().unwrap_or(false);
            self.index += 1;
            decision
        }
    }

    const FRAME_MS: u64 = 30;
    const FRAME_SAMPLES: usize = 480;

    fn frames(n: usize) -> Vec<i16> {
        vec![0i16; FRAME_SAMPLES * n]
    }

    fn segmenter(decisions: Vec<bool>) -> VadSegmenter<Scripted> {
        VadSegmenter::new(Scripted::new(decisions), SegmenterConfig::default())
    }

    fn decisions(speech: usize, silence: usize) -> Vec<bool> {
        let mut d = vec![true; speech];
        d.extend(vec![false; silence]);
        d
    }

    fn collect_segments(events: Vec<VadEvent>) -> Vec<Segment> {
        events
            .into_iter()
            .filter_map(|e| match e {
                VadEvent::Segment(s) => Some(s),
                VadEvent::Silence { .. } => None,
            })
            .collect()
    }

    #[test]
    fn basic_segment_with_exact_boundaries() {
        // 20 speech frames (600ms) then enough silence to close.
        let mut seg = segmenter(decisions(20, 12));
        let events = seg.push(&frames(32));
        let segments = collect_segments(events);

        assert_eq!(segments.len(), 1);
        let s = &segments[0];
        assert_eq!(s.seq, 0);
        assert_eq!(s.start_ms, 0);
        assert_eq!(s.end_ms, 20 * FRAME_MS);
        assert_eq!(s.pcm.len(), 20 * FRAME_SAMPLES);
        assert_eq!(s.leading_silence_ms, 0);
    }

    #[test]
    fn short_isolated_burst_is_not_emitted() {
        // 9 frames = 270ms < 300ms minimum, then long silence.
        let mut seg = segmenter(decisions(9, 60));
        let mut events = seg.push(&frames(69));
        events.extend(seg.flush());
        assert!(collect_segments(events).is_empty());
    }

    #[test]
    fn short_burst_is_absorbed_into_next_segment() {
        // 9 speech, 12 silence (close, gap 360ms <= 1000ms), 20 speech, close.
        let mut d = decisions(9, 12);
        d.extend(decisions(20, 12));
        let mut seg = segmenter(d);
        let segments = collect_segments(seg.push(&frames(53)));

        assert_eq!(segments.len(), 1);
        let s = &segments[0];
        // The absorbed burst's start becomes the segment start.
        assert_eq!(s.start_ms, 0);
        assert_eq!(s.pcm.len(), (9 + 20) * FRAME_SAMPLES);
        assert_eq!(s.seq, 0);
    }

    #[test]
    fn long_speech_is_force_cut_without_gap() {
        // 670 speech frames = 20100ms of continuous speech, then close.
        let mut seg = segmenter(decisions(670, 12));
        let segments = collect_segments(seg.push(&frames(682)));

        assert_eq!(segments.len(), 2);
        let total: u64 = segments.iter().map(|s| s.end_ms - s.start_ms).sum();
        assert_eq!(total, 670 * FRAME_MS);
        // No gap at the cut.
        assert_eq!(segments[0].end_ms, segments[1].start_ms);
        assert!(segments[0].end_ms - segments[0].start_ms <= 20_000);
        assert_eq!(segments[0].seq, 0);
        assert_eq!(segments[1].seq, 1);
    }

    #[test]
    fn seq_and_time_ranges_are_monotonic() {
        // Three utterances separated by silence.
        let mut d = Vec::new();
        for _ in 0..3 {
            d.extend(decisions(15, 15));
        }
        let mut seg = segmenter(d);
        let segments = collect_segments(seg.push(&frames(90)));

        assert_eq!(segments.len(), 3);
        for pair in segments.windows(2) {
            assert_eq!(pair[1].seq, pair[0].seq + 1);
            assert!(pair[0].end_ms <= pair[1].start_ms);
        }
    }

    #[test]
    fn leading_silence_is_measured_between_segments() {
        // 15 speech, 25 silence (750ms), 15 speech, close.
        let mut d = decisions(15, 25);
        d.extend(decisions(15, 12));
        let mut seg = segmenter(d);
        let segments = collect_segments(seg.push(&frames(67)));

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].leading_silence_ms, 25 * FRAME_MS);
    }

    #[test]
    fn idle_silence_is_reported_once_per_run() {
        // 15 speech, then 80 frames of silence = 2400ms idle.
        let mut seg = segmenter(decisions(15, 80));
        let events = seg.push(&frames(95));

        let silences: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                VadEvent::Silence { duration_ms } => Some(*duration_ms),
                _ => None,
            })
            .collect();
        assert_eq!(silences.len(), 1);
        assert!(silences[0] >= 1500);
    }

    #[test]
    fn flush_emits_in_progress_speech() {
        let mut seg = segmenter(decisions(20, 0));
        assert!(collect_segments(seg.push(&frames(20))).is_empty());
        let segments = collect_segments(seg.flush());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_ms, 20 * FRAME_MS);
    }

    #[test]
    fn trailing_silence_is_trimmed_from_segment() {
        let mut seg = segmenter(decisions(20, 12));
        let segments = collect_segments(seg.push(&frames(32)));
        // post_pad silent frames were appended during detection but must
        // not appear in the emitted pcm.
        assert_eq!(segments[0].pcm.len(), 20 * FRAME_SAMPLES);
    }

    #[test]
    fn energy_classifier_thresholds() {
        let mut c = EnergyClassifier::new(2);
        assert!(!c.is_speech(&vec![0i16; FRAME_SAMPLES]));
        assert!(c.is_speech(&vec![3000i16; FRAME_SAMPLES]));
        assert!(!c.is_speech(&[]));
    }
}
