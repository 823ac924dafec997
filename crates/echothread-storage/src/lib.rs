// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for echothread.
//!
//! One local database file holds the `workspaces`, `user_cookies`, and
//! `user_settings` tables (§ data model). Secret columns are sealed by the
//! vault before they reach a row. Writes are serialized through a single
//! background connection; migrations (including the legacy single-workspace
//! upgrade) run on open, before any other operation.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod user_store;
pub mod workspace_store;

pub use database::Database;
pub use user_store::UserSecretStore;
pub use workspace_store::WorkspaceStore;

/// Environment variable naming the database file.
pub const DB_PATH_ENV_VAR: &str = "USER_COOKIES_DB_PATH";

/// Default database path when the env var is unset.
pub const DEFAULT_DB_PATH: &str = "user_cookies.db";

/// Resolves the database path from the environment.
pub fn db_path_from_env() -> String {
    std::env::var(DB_PATH_ENV_VAR).unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}
