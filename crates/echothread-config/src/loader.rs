// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading with environment overrides.

use std::path::Path;

use echothread_core::EchoError;
use tracing::{debug, info};

use crate::model::EchoConfig;

/// Loads configuration from `path`, or returns defaults when `path` is
/// `None` or does not exist. Environment overrides are applied last.
pub fn load(path: Option<&Path>) -> Result<EchoConfig, EchoError> {
    let mut config = match path {
        Some(p) if p.exists() => {
            let raw = std::fs::read_to_string(p).map_err(|e| {
                EchoError::Config(format!("cannot read config file {}: {e}", p.display()))
            })?;
            let parsed: EchoConfig = toml::from_str(&raw).map_err(|e| {
                EchoError::Config(format!("malformed config file {}: {e}", p.display()))
            })?;
            info!(path = %p.display(), "configuration loaded");
            parsed
        }
        Some(p) => {
            return Err(EchoError::Config(format!(
                "config file not found: {}",
                p.display()
            )));
        }
        None => {
            debug!("no config file given, using defaults");
            EchoConfig::default()
        }
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Validates cross-field constraints the type system cannot express.
fn validate(config: &EchoConfig) -> Result<(), EchoError> {
    if !matches!(config.vad.frame_ms, 10 | 20 | 30) {
        return Err(EchoError::Config(format!(
            "vad.frame_ms must be 10, 20, or 30 (got {})",
            config.vad.frame_ms
        )));
    }
    if config.vad.aggressiveness > 3 {
        return Err(EchoError::Config(format!(
            "vad.aggressiveness must be 0..=3 (got {})",
            config.vad.aggressiveness
        )));
    }
    const MODELS: [&str; 5] = ["tiny", "base", "small", "medium", "large"];
    if !MODELS.contains(&config.whisper.model.as_str()) {
        return Err(EchoError::Config(format!(
            "whisper.model must be one of {MODELS:?} (got {:?})",
            config.whisper.model
        )));
    }
    Ok(())
}

fn apply_env_overrides(config: &mut EchoConfig) {
    if let Ok(channel) = std::env::var("SLACK_DEFAULT_CHANNEL") {
        if !channel.is_empty() {
            config.slack.channel = Some(channel);
        }
    }
}

/// Returns the commented default configuration document written by
/// `echothread create-config`.
pub fn default_config_toml() -> String {
    r##"# echothread configuration

[whisper]
# Model size: tiny, base, small, medium, large.
model = "base"
# Inference device: "cpu", "cuda", "metal".
device = "cpu"
# Decoding language; "auto" detects it from the first segments.
language = "auto"

[youtube]
download_dir = "./downloads"
format = "bestaudio/best"
keep_video = false

[slack]
# channel = "#transcripts"
include_timestamps = false
send_errors_to_slack = true

[vad]
# 0..=3, higher rejects more non-speech.
aggressiveness = 2
frame_ms = 30
flush_silence_ms = 1500
soft_len = 120
hard_len = 400

[server]
host = "0.0.0.0"
port = 42389
"##
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_parses_back() {
        let parsed: EchoConfig = toml::from_str(&default_config_toml()).unwrap();
        assert_eq!(parsed.vad.frame_ms, 30);
        assert_eq!(parsed.whisper.model, "base");
        assert_eq!(parsed.server.port, 42389);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load(Some(Path::new("/nonexistent/echothread.toml"))).unwrap_err();
        assert!(matches!(err, EchoError::Config(_)));
    }

    #[test]
    fn no_path_yields_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.vad.aggressiveness, 2);
        assert_eq!(config.vad.flush_silence_ms, 1500);
    }

    #[test]
    fn invalid_frame_ms_rejected() {
        let mut config = EchoConfig::default();
        config.vad.frame_ms = 25;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn invalid_model_rejected() {
        let mut config = EchoConfig::default();
        config.whisper.model = "enormous".into();
        assert!(validate(&config).is_err());
    }
}
