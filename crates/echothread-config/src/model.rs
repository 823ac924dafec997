// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for echothread.
//!
//! Unknown keys anywhere in the document are captured into `extra` tables
//! so user config survives round-trips across versions; they are never
//! interpreted.

use serde::{Deserialize, Serialize};

/// Top-level echothread configuration, loaded from a TOML file.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EchoConfig {
    /// Local speech-to-text settings.
    #[serde(default)]
    pub whisper: WhisperConfig,

    /// Media download settings.
    #[serde(default)]
    pub youtube: YoutubeConfig,

    /// Slack posting settings.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Voice-activity detection and sentence assembly tuning.
    #[serde(default)]
    pub vad: VadConfig,

    /// Inbound HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Unknown top-level keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: toml::Table,
}

/// Local speech-to-text configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WhisperConfig {
    /// Model size: one of tiny, base, small, medium, large.
    #[serde(default = "default_whisper_model")]
    pub model: String,

    /// Inference device: "cpu", "cuda", "metal".
    #[serde(default = "default_whisper_device")]
    pub device: String,

    /// Decoding language ("auto" lets the model detect it).
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: default_whisper_model(),
            device: default_whisper_device(),
            language: default_language(),
            extra: toml::Table::new(),
        }
    }
}

impl WhisperConfig {
    /// Whether a dedicated accelerator is configured. The transcription
    /// pool runs a single worker in that case.
    pub fn uses_gpu(&self) -> bool {
        self.device != "cpu"
    }
}

fn default_whisper_model() -> String {
    "base".to_string()
}

fn default_whisper_device() -> String {
    "cpu".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

/// Media download configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YoutubeConfig {
    /// Scratch directory for the downloader.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// yt-dlp format selector.
    #[serde(default = "default_format")]
    pub format: String,

    /// Keep intermediate video files (batch mode only; live streams never
    /// touch disk).
    #[serde(default)]
    pub keep_video: bool,

    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            format: default_format(),
            keep_video: false,
            extra: toml::Table::new(),
        }
    }
}

fn default_download_dir() -> String {
    "./downloads".to_string()
}

fn default_format() -> String {
    "bestaudio/best".to_string()
}

/// Slack posting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlackConfig {
    /// Legacy incoming-webhook fallback; unused when bot tokens are
    /// configured.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Default channel for streams started without an explicit channel.
    #[serde(default)]
    pub channel: Option<String>,

    /// Prefix posted sentences with their `[hh:mm:ss]` offset.
    #[serde(default)]
    pub include_timestamps: bool,

    /// Post failure notices into the thread as well as the log.
    #[serde(default = "default_true")]
    pub send_errors_to_slack: bool,

    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            channel: None,
            include_timestamps: false,
            send_errors_to_slack: true,
            extra: toml::Table::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Voice-activity detection and sentence assembly tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VadConfig {
    /// webrtc-vad aggressiveness, 0..=3 (higher = stricter).
    #[serde(default = "default_aggressiveness")]
    pub aggressiveness: u8,

    /// Frame duration in ms; must be 10, 20, or 30.
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u32,

    /// Silence that flushes the sentence buffer.
    #[serde(default = "default_flush_silence_ms")]
    pub flush_silence_ms: u64,

    /// Buffer length past which a soft terminator ends a sentence.
    #[serde(default = "default_soft_len")]
    pub soft_len: usize,

    /// Buffer length that ends a sentence unconditionally.
    #[serde(default = "default_hard_len")]
    pub hard_len: usize,

    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            aggressiveness: default_aggressiveness(),
            frame_ms: default_frame_ms(),
            flush_silence_ms: default_flush_silence_ms(),
            soft_len: default_soft_len(),
            hard_len: default_hard_len(),
            extra: toml::Table::new(),
        }
    }
}

fn default_aggressiveness() -> u8 {
    2
}

fn default_frame_ms() -> u32 {
    30
}

fn default_flush_silence_ms() -> u64 {
    1500
}

fn default_soft_len() -> usize {
    120
}

fn default_hard_len() -> usize {
    400
}

/// Inbound HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            extra: toml::Table::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    42389
}
