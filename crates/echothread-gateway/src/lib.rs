// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound HTTP surface.
//!
//! Serves the liveness endpoint and the Slack webhooks. Webhook bodies
//! are verified against the workspace's signing secret before any routing
//! happens; the handlers then translate payloads into [`Command`]s on the
//! shared channel and acknowledge immediately.
//!
//! [`Command`]: echothread_core::types::Command

pub mod handlers;
pub mod server;

pub use server::{start_server, GatewayState};
