// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech-to-text engine trait.

use crate::error::EchoError;
use crate::types::Utterance;

/// A local speech-to-text engine.
///
/// `transcribe` is blocking and CPU/GPU bound; callers run it on the
/// blocking thread pool. The transcription worker pool serializes access
/// when a single accelerator is configured.
pub trait SpeechEngine: Send + Sync {
    /// Transcribes 16 kHz mono PCM. The hint, when present, pins the
    /// decoding language; otherwise the engine detects it.
    fn transcribe(
        &self,
        pcm: &[i16],
        language_hint: Option<&str>,
    ) -> Result<Utterance, EchoError>;

    /// Whether the engine is bound to a single accelerator device.
    fn exclusive_device(&self) -> bool {
        false
    }
}
