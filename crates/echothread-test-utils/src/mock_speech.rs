// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock speech engine returning canned transcriptions.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use echothread_core::{EchoError, SpeechEngine, Utterance};

/// Mock [`SpeechEngine`] that pops scripted responses in order; when the
/// script is exhausted it echoes a generic line. Each call can be slowed
/// or failed to exercise backpressure and escalation paths.
pub struct MockSpeechEngine {
    script: Mutex<VecDeque<Utterance>>,
    delay: Mutex<Option<Duration>>,
    failures_remaining: Mutex<u32>,
    calls: Mutex<u32>,
}

impl MockSpeechEngine {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            failures_remaining: Mutex::new(0),
            calls: Mutex::new(0),
        }
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine = Self::new();
        {
            let mut script = engine.script.lock().unwrap();
            for text in responses {
                script.push_back(Utterance {
                    text: text.into(),
                    language: Some("ja".into()),
                });
            }
        }
        engine
    }

    /// Each transcription sleeps this long (on the blocking thread).
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// The next `n` calls fail with a transcription error.
    pub fn with_failures(self, n: u32) -> Self {
        *self.failures_remaining.lock().unwrap() = n;
        self
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Default for MockSpeechEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechEngine for MockSpeechEngine {
    fn transcribe(
        &self,
        _pcm: &[i16],
        language_hint: Option<&str>,
    ) -> Result<Utterance, EchoError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(delay) = *self.delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        {
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(EchoError::Transcription {
                    message: "scripted transcription failure".into(),
                    source: None,
                });
            }
        }
        let scripted = self.script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(Utterance {
            text: "generic utterance.".into(),
            language: language_hint.map(str::to_string).or(Some("en".into())),
        }))
    }
}
