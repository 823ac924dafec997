// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sentence assembly.
//!
//! Transcribed fragments arrive in `seq` order and accumulate in a rolling
//! buffer. A sentence is emitted when a strong terminator closes, when a
//! soft terminator closes an already-long buffer, when the VAD reports
//! enough silence, or when the buffer grows past the hard cap. Silence
//! takes priority over punctuation: the reported silence duration is the
//! only clock the assembler consults.

use std::collections::VecDeque;

use echothread_core::types::Sentence;
use tracing::debug;

const STRONG_TERMINATORS: [char; 6] = ['.', '?', '!', '。', '？', '！'];
const SOFT_TERMINATORS: [char; 4] = [',', '、', ';', ':'];

/// Assembly tuning.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Buffer length past which a soft terminator ends a sentence.
    pub soft_len: usize,
    /// Buffer length that forces a cut.
    pub hard_len: usize,
    /// Reported silence that flushes the buffer.
    pub flush_silence_ms: u64,
    /// How many recent sentences the duplicate filter remembers.
    pub dedup_window: usize,
    /// Jaccard similarity above which a fragment counts as a repeat.
    pub dedup_similarity: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            soft_len: 120,
            hard_len: 400,
            flush_silence_ms: 1500,
            dedup_window: 10,
            dedup_similarity: 0.8,
        }
    }
}

/// One buffered fragment's bookkeeping: how many buffer chars it owns
/// (including its trailing separator) and its time range.
struct Frag {
    chars: usize,
    start_ms: u64,
    end_ms: u64,
}

/// Per-stream rolling buffer of transcribed fragments.
pub struct SentenceAssembler {
    config: AssemblerConfig,
    buffer: Vec<char>,
    fragments: VecDeque<Frag>,
    ord: u64,
    recent: VecDeque<String>,
}

impl SentenceAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            fragments: VecDeque::new(),
            ord: 0,
            recent: VecDeque::new(),
        }
    }

    /// Feeds one transcribed fragment; returns any sentences it completes.
    ///
    /// `leading_silence_ms` is the VAD-reported gap before this fragment's
    /// segment; crossing the flush threshold closes the buffered sentence
    /// before the fragment is appended.
    pub fn push_fragment(
        &mut self,
        text: &str,
        start_ms: u64,
        end_ms: u64,
        leading_silence_ms: u64,
    ) -> Vec<Sentence> {
        let mut out = Vec::new();
        if leading_silence_ms >= self.config.flush_silence_ms {
            out.extend(self.flush());
        }

        let text = text.trim();
        if text.is_empty() {
            return out;
        }
        if self.is_duplicate(text) {
            debug!(fragment = text, "dropping repeated fragment");
            return out;
        }

        if !self.buffer.is_empty() {
            self.buffer.push(' ');
            if let Some(last) = self.fragments.back_mut() {
                last.chars += 1;
            }
        }
        let chars: Vec<char> = text.chars().collect();
        self.fragments.push_back(Frag {
            chars: chars.len(),
            start_ms,
            end_ms,
        });
        self.buffer.extend(chars);

        out.extend(self.drain_ready());
        out
    }

    /// The VAD reported ongoing silence with no new segment; flushes the
    /// buffer when the threshold is crossed.
    pub fn report_silence(&mut self, duration_ms: u64) -> Option<Sentence> {
        if duration_ms >= self.config.flush_silence_ms {
            self.flush()
        } else {
            None
        }
    }

    /// Emits whatever is buffered, if anything.
    pub fn flush(&mut self) -> Option<Sentence> {
        if self.buffer.iter().all(|c| c.is_whitespace()) {
            self.buffer.clear();
            self.fragments.clear();
            return None;
        }
        Some(self.cut(self.buffer.len()))
    }

    /// Next ordinal to be assigned.
    pub fn next_ord(&self) -> u64 {
        self.ord
    }

    fn drain_ready(&mut self) -> Vec<Sentence> {
        let mut out = Vec::new();
        loop {
            if let Some(pos) = self.find_terminator(&STRONG_TERMINATORS) {
                out.push(self.cut(pos + 1));
                continue;
            }
            if self.buffer.len() > self.config.soft_len {
                if let Some(pos) = self.rfind_terminator() {
                    out.push(self.cut(pos + 1));
                    continue;
                }
            }
            if self.buffer.len() > self.config.hard_len {
                let cut_at = self.buffer[..self.config.hard_len]
                    .iter()
                    .rposition(|c| c.is_whitespace())
                    .unwrap_or(self.config.hard_len);
                out.push(self.cut(cut_at.max(1)));
                continue;
            }
            break;
        }
        out
    }

    /// First terminator from `set` that closes a unit: followed by
    /// whitespace or sitting at the end of the buffer. A terminator glued
    /// to more text (a dot inside "example.com/path") never splits.
    fn find_terminator(&self, set: &[char]) -> Option<usize> {
        let n = self.buffer.len();
        (0..n).find(|&i| {
            set.contains(&self.buffer[i]) && (i + 1 == n || self.buffer[i + 1].is_whitespace())
        })
    }

    /// Last soft-or-strong terminator that closes a unit.
    fn rfind_terminator(&self) -> Option<usize> {
        let n = self.buffer.len();
        (0..n).rev().find(|&i| {
            (SOFT_TERMINATORS.contains(&self.buffer[i])
                || STRONG_TERMINATORS.contains(&self.buffer[i]))
                && (i + 1 == n || self.buffer[i + 1].is_whitespace())
        })
    }

    /// Emits the first `end_exclusive` buffered chars as a sentence and
    /// consumes them (plus any following whitespace) from the buffer and
    /// the fragment ledger.
    fn cut(&mut self, end_exclusive: usize) -> Sentence {
        let mut consumed = end_exclusive;
        while consumed < self.buffer.len() && self.buffer[consumed].is_whitespace() {
            consumed += 1;
        }

        let text: String = self.buffer[..end_exclusive]
            .iter()
            .collect::<String>()
            .trim()
            .to_string();
        self.buffer.drain(..consumed);

        let start_ms = self.fragments.front().map(|f| f.start_ms).unwrap_or(0);
        let mut end_ms = start_ms;
        let mut remaining = consumed;
        while remaining > 0 {
            let Some(front) = self.fragments.front_mut() else {
                break;
            };
            end_ms = front.end_ms;
            if front.chars <= remaining {
                remaining -= front.chars;
                self.fragments.pop_front();
            } else {
                front.chars -= remaining;
                remaining = 0;
            }
        }

        self.remember(&text);
        let ord = self.ord;
        self.ord += 1;
        Sentence {
            ord,
            text,
            start_ms,
            end_ms,
        }
    }

    fn remember(&mut self, text: &str) {
        self.recent.push_back(normalize(text));
        while self.recent.len() > self.config.dedup_window {
            self.recent.pop_front();
        }
    }

    /// Exact or near matches against recently emitted sentences are
    /// repeats; Whisper tends to hallucinate them over silence.
    fn is_duplicate(&self, text: &str) -> bool {
        let normalized = normalize(text);
        self.recent.iter().any(|recent| {
            *recent == normalized
                || jaccard(recent, &normalized) > self.config.dedup_similarity
        })
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Word-set Jaccard similarity.
fn jaccard(a: &str, b: &str) -> f64 {
    let wa: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let wb: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let intersection = wa.intersection(&wb).count() as f64;
    let union = wa.union(&wb).count() as f64;
    intersection / union
}
