// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workspace table operations.

use echothread_core::EchoError;
use rusqlite::{params, Row};

use crate::database::{map_tr_err, Database};
use crate::models::WorkspaceRow;

fn row_to_workspace(row: &Row<'_>) -> Result<WorkspaceRow, rusqlite::Error> {
    Ok(WorkspaceRow {
        team_id: row.get(0)?,
        team_name: row.get(1)?,
        bot_token: row.get(2)?,
        signing_secret: row.get(3)?,
        app_token: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const SELECT_COLUMNS: &str = "team_id, team_name, bot_token, signing_secret, app_token, \
                              active, created_at, updated_at";

/// Upsert a workspace. Re-adding an existing team updates its credentials
/// and refreshes `updated_at`; `created_at` and `active` are preserved.
pub async fn upsert(db: &Database, row: WorkspaceRow) -> Result<(), EchoError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO workspaces (team_id, team_name, bot_token, signing_secret, app_token)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(team_id) DO UPDATE SET
                     team_name = excluded.team_name,
                     bot_token = excluded.bot_token,
                     signing_secret = excluded.signing_secret,
                     app_token = excluded.app_token,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    row.team_id,
                    row.team_name,
                    row.bot_token,
                    row.signing_secret,
                    row.app_token,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, team_id: &str) -> Result<Option<WorkspaceRow>, EchoError> {
    let team_id = team_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM workspaces WHERE team_id = ?1"
            ))?;
            let mut rows = stmt.query_map(params![team_id], row_to_workspace)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list(db: &Database, active_only: bool) -> Result<Vec<WorkspaceRow>, EchoError> {
    db.connection()
        .call(move |conn| {
            let sql = if active_only {
                format!(
                    "SELECT {SELECT_COLUMNS} FROM workspaces WHERE active = 1 ORDER BY created_at"
                )
            } else {
                format!("SELECT {SELECT_COLUMNS} FROM workspaces ORDER BY created_at")
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], row_to_workspace)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Returns true when a row was removed.
pub async fn delete(db: &Database, team_id: &str) -> Result<bool, EchoError> {
    let team_id = team_id.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute("DELETE FROM workspaces WHERE team_id = ?1", params![team_id])?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Soft-activates or deactivates a workspace. Returns true when found.
pub async fn set_active(db: &Database, team_id: &str, active: bool) -> Result<bool, EchoError> {
    let team_id = team_id.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE workspaces SET active = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE team_id = ?2",
                params![active as i64, team_id],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn has_any(db: &Database) -> Result<bool, EchoError> {
    db.connection()
        .call(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM workspaces", [], |r| r.get(0))?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}
