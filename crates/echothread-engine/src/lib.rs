// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The streaming transcription engine.
//!
//! This crate is the core of echothread: the concurrent pipeline that
//! turns live audio into ordered thread posts. Per stream, a reader task
//! pumps PCM from the media source into a blocking VAD stage, a submitter
//! feeds detected speech segments into the shared transcription pool, and
//! an assembler/poster consumes results in `seq` order, emitting
//! sentence-bounded text into the chat thread in strictly increasing
//! `ord`.
//!
//! Backpressure flows backwards through bounded channels: a saturated
//! pool stalls the submitter, which eventually drops the oldest pending
//! segment rather than fall behind a live source. The stream controller
//! owns cancellation and the lifecycle state machine; the registries
//! enforce the one-stream-per-user rule and route commands.

pub mod assembler;
pub mod controller;
pub mod pool;
pub mod registry;
pub mod router;
pub mod vad;

pub use assembler::{AssemblerConfig, SentenceAssembler};
pub use controller::{StreamController, StreamSettings, StreamSnapshot, StreamSpawnArgs};
pub use pool::TranscriptionPool;
pub use registry::StreamRegistry;
pub use router::{CommandRouter, RouterContext};
pub use vad::{SegmenterConfig, VadSegmenter};
