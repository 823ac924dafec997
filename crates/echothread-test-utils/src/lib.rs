// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock adapters for deterministic echothread tests.
//!
//! Provides mock implementations of the core adapter traits:
//! [`MockChatPoster`] records posts and header edits, [`MockMediaSource`]
//! replays scripted PCM, and [`MockSpeechEngine`] returns canned
//! transcriptions with optional delays and failures.

pub mod mock_chat;
pub mod mock_media;
pub mod mock_speech;

pub use mock_chat::{MockChatLookup, MockChatPoster, RecordedPost};
pub use mock_media::{tone, MockMediaSource};
pub use mock_speech::MockSpeechEngine;
