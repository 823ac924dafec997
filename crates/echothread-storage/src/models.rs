// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types as stored: secret columns are sealed blobs.
//!
//! The decrypted views live in `echothread-core::types`; the stores in this
//! crate translate between the two with the vault.

/// A `workspaces` row with sealed credential columns.
#[derive(Debug, Clone)]
pub struct WorkspaceRow {
    pub team_id: String,
    pub team_name: String,
    pub bot_token: Vec<u8>,
    pub signing_secret: Vec<u8>,
    pub app_token: Option<Vec<u8>>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A `user_cookies` or `user_settings` row with its sealed value column.
#[derive(Debug, Clone)]
pub struct UserSecretRow {
    pub team_id: String,
    pub user_id: String,
    pub value: Vec<u8>,
    pub updated_at: String,
}
