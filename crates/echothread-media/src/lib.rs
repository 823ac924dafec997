// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media source for echothread.
//!
//! Wraps yt-dlp (probing, URL resolution, cookie authentication) and
//! ffmpeg (decode to 16 kHz mono s16le) behind the [`MediaSource`] trait.
//! Start failures are classified so the stream controller can tell users
//! whether to re-upload cookies or just wait.
//!
//! [`MediaSource`]: echothread_core::MediaSource

pub mod source;
pub mod ytdlp;

pub use source::YtDlpSource;
