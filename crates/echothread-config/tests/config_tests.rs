// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration parsing and loading.

use std::io::Write;

use echothread_config::{load, EchoConfig};

#[test]
fn full_document_parses() {
    let doc = r##"
[whisper]
model = "small"
device = "cuda"
language = "ja"

[youtube]
download_dir = "/tmp/dl"
format = "bestaudio"
keep_video = true

[slack]
channel = "#live"
include_timestamps = true
send_errors_to_slack = false

[vad]
aggressiveness = 3
frame_ms = 20
flush_silence_ms = 2000
soft_len = 100
hard_len = 300

[server]
host = "127.0.0.1"
port = 8080
"##;
    let config: EchoConfig = toml::from_str(doc).unwrap();
    assert_eq!(config.whisper.model, "small");
    assert!(config.whisper.uses_gpu());
    assert_eq!(config.youtube.download_dir, "/tmp/dl");
    assert!(config.youtube.keep_video);
    assert_eq!(config.slack.channel.as_deref(), Some("#live"));
    assert!(config.slack.include_timestamps);
    assert!(!config.slack.send_errors_to_slack);
    assert_eq!(config.vad.aggressiveness, 3);
    assert_eq!(config.vad.frame_ms, 20);
    assert_eq!(config.server.port, 8080);
}

#[test]
fn empty_document_gets_defaults() {
    let config: EchoConfig = toml::from_str("").unwrap();
    assert_eq!(config.whisper.model, "base");
    assert!(!config.whisper.uses_gpu());
    assert_eq!(config.vad.frame_ms, 30);
    assert_eq!(config.vad.soft_len, 120);
    assert_eq!(config.vad.hard_len, 400);
    assert_eq!(config.slack.channel, None);
    assert!(config.slack.send_errors_to_slack);
}

#[test]
fn unknown_keys_are_preserved_not_rejected() {
    let doc = r#"
future_section_marker = "kept"

[whisper]
model = "tiny"
experimental_beam = 5

[vad]
aggressiveness = 1
custom_gate = true
"#;
    let config: EchoConfig = toml::from_str(doc).unwrap();
    assert_eq!(config.whisper.model, "tiny");
    assert_eq!(config.vad.aggressiveness, 1);
    // Unknown keys land in the capture tables instead of failing the parse.
    assert!(config.extra.contains_key("future_section_marker"));
    assert!(config.whisper.extra.contains_key("experimental_beam"));
    assert!(config.vad.extra.contains_key("custom_gate"));
}

#[test]
fn load_reads_file_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echothread.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "[vad]\nframe_ms = 10").unwrap();

    let config = load(Some(&path)).unwrap();
    assert_eq!(config.vad.frame_ms, 10);
}

#[test]
fn load_rejects_bad_frame_ms() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echothread.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "[vad]\nframe_ms = 42").unwrap();

    assert!(load(Some(&path)).is_err());
}
