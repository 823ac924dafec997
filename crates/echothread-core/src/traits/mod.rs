// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits for the external collaborators of the transcription core.

pub mod chat;
pub mod media;
pub mod speech;

pub use chat::{ChatLookup, ChatPoster};
pub use media::{MediaSource, PcmStream, SAMPLE_RATE_HZ};
pub use speech::SpeechEngine;
