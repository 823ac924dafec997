// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for echothread, a live-stream transcription bot.
//!
//! This crate provides the error taxonomy, shared domain types, and the
//! adapter traits the transcription engine is written against. The engine
//! itself lives in `echothread-engine`; platform implementations live in
//! `echothread-slack`, `echothread-media`, and `echothread-whisper`.

pub mod cookies;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{EchoError, MediaFailureKind, PostFailureKind};
pub use traits::{ChatLookup, ChatPoster, MediaSource, PcmStream, SpeechEngine, SAMPLE_RATE_HZ};
pub use types::{
    Command, Sentence, Segment, StreamId, StreamMetadata, StreamState, TeamId, UserId, Utterance,
};
