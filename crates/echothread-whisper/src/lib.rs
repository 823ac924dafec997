// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whisper speech engine.
//!
//! Wraps whisper-rs behind [`SpeechEngine`]. The context is loaded once;
//! each transcription gets its own decoding state, so concurrent callers
//! are safe, and the transcription pool decides how many run at once.
//!
//! [`SpeechEngine`]: echothread_core::SpeechEngine

use std::path::{Path, PathBuf};

use echothread_core::{EchoError, SpeechEngine, Utterance};

/// Resolves a model name like `base` to its ggml file under `dir`.
pub fn model_file_for(dir: &Path, model: &str) -> PathBuf {
    dir.join(format!("ggml-{model}.bin"))
}

/// Converts i16 PCM to the f32 `[-1.0, 1.0]` range Whisper expects.
pub fn convert_audio(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

#[cfg(feature = "whisper")]
mod engine {
    use super::*;
    use tracing::{debug, info};
    use whisper_rs::{
        FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
    };

    /// Local Whisper model behind the [`SpeechEngine`] trait.
    pub struct WhisperEngine {
        context: WhisperContext,
        use_gpu: bool,
    }

    impl WhisperEngine {
        /// Loads the ggml model at `model_path`.
        pub fn load(model_path: &Path, use_gpu: bool) -> Result<Self, EchoError> {
            if !model_path.exists() {
                return Err(EchoError::Config(format!(
                    "whisper model not found: {}",
                    model_path.display()
                )));
            }
            let mut params = WhisperContextParameters::default();
            params.use_gpu(use_gpu);
            let path = model_path.to_str().ok_or_else(|| {
                EchoError::Config("whisper model path is not valid UTF-8".into())
            })?;
            let context = WhisperContext::new_with_params(path, params).map_err(|e| {
                EchoError::Config(format!("failed to load whisper model: {e}"))
            })?;
            info!(model = %model_path.display(), use_gpu, "whisper model loaded");
            Ok(Self { context, use_gpu })
        }
    }

    impl SpeechEngine for WhisperEngine {
        fn transcribe(
            &self,
            pcm: &[i16],
            language_hint: Option<&str>,
        ) -> Result<Utterance, EchoError> {
            let audio = convert_audio(pcm);

            let mut state = self.context.create_state().map_err(|e| {
                EchoError::Transcription {
                    message: format!("failed to create whisper state: {e}"),
                    source: Some(Box::new(e)),
                }
            })?;

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_language(language_hint);
            params.set_translate(false);
            params.set_print_special(false);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);

            state.full(params, &audio).map_err(|e| EchoError::Transcription {
                message: format!("whisper inference failed: {e}"),
                source: Some(Box::new(e)),
            })?;

            let n_segments = state.full_n_segments().map_err(|e| EchoError::Transcription {
                message: format!("failed to read segment count: {e}"),
                source: Some(Box::new(e)),
            })?;

            let mut text = String::new();
            for i in 0..n_segments {
                match state.full_get_segment_text(i) {
                    Ok(segment) => text.push_str(&segment),
                    Err(e) => debug!(segment = i, error = %e, "skipping unreadable segment"),
                }
            }

            let lang_id = state.full_lang_id_from_state();
            let language = whisper_rs::get_lang_str(lang_id).map(str::to_string);

            Ok(Utterance {
                text: text.trim().to_string(),
                language,
            })
        }

        fn exclusive_device(&self) -> bool {
            self.use_gpu
        }
    }
}

#[cfg(feature = "whisper")]
pub use engine::WhisperEngine;

/// Stub used when the crate is built without the `whisper` feature; lets
/// the rest of the workspace compile without the C toolchain.
#[cfg(not(feature = "whisper"))]
pub struct WhisperEngine;

#[cfg(not(feature = "whisper"))]
impl WhisperEngine {
    pub fn load(_model_path: &Path, _use_gpu: bool) -> Result<Self, EchoError> {
        Err(EchoError::Config(
            "echothread was built without whisper support; rebuild with the 'whisper' feature"
                .into(),
        ))
    }
}

#[cfg(not(feature = "whisper"))]
impl SpeechEngine for WhisperEngine {
    fn transcribe(
        &self,
        _pcm: &[i16],
        _language_hint: Option<&str>,
    ) -> Result<Utterance, EchoError> {
        Err(EchoError::Transcription {
            message: "whisper support not compiled in".into(),
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_resolution() {
        let path = model_file_for(Path::new("/models"), "small");
        assert_eq!(path, PathBuf::from("/models/ggml-small.bin"));
    }

    #[test]
    fn audio_conversion_normalizes() {
        let converted = convert_audio(&[0, i16::MAX, i16::MIN, 16384]);
        assert_eq!(converted[0], 0.0);
        assert!((converted[1] - 0.99997).abs() < 1e-4);
        assert_eq!(converted[2], -1.0);
        assert!((converted[3] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn loading_missing_model_is_config_error() {
        let err = WhisperEngine::load(Path::new("/nonexistent/ggml-tiny.bin"), false).unwrap_err();
        assert!(matches!(err, EchoError::Config(_)));
    }
}
