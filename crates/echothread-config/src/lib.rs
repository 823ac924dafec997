// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading for echothread.
//!
//! Config comes from a TOML file with optional env overrides. Unknown keys
//! are preserved and ignored so older binaries tolerate newer config files.

pub mod loader;
pub mod model;

pub use loader::{default_config_toml, load};
pub use model::{EchoConfig, ServerConfig, SlackConfig, VadConfig, WhisperConfig, YoutubeConfig};
