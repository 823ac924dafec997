// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User cookie and settings table operations.
//!
//! Both tables share the `(team_id, user_id) -> sealed blob` shape; the
//! table name is threaded through a constant to keep the SQL static.

use echothread_core::EchoError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::UserSecretRow;

/// Which user table an operation targets.
#[derive(Debug, Clone, Copy)]
pub enum UserTable {
    Cookies,
    Settings,
}

impl UserTable {
    fn name(self) -> &'static str {
        match self {
            UserTable::Cookies => "user_cookies",
            UserTable::Settings => "user_settings",
        }
    }

    fn value_column(self) -> &'static str {
        match self {
            UserTable::Cookies => "cookies",
            UserTable::Settings => "settings",
        }
    }
}

pub async fn upsert(
    db: &Database,
    table: UserTable,
    team_id: &str,
    user_id: &str,
    value: Vec<u8>,
) -> Result<(), EchoError> {
    let team_id = team_id.to_string();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {t} (team_id, user_id, {v}) VALUES (?1, ?2, ?3)
                     ON CONFLICT(team_id, user_id) DO UPDATE SET
                         {v} = excluded.{v},
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    t = table.name(),
                    v = table.value_column(),
                ),
                params![team_id, user_id, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(
    db: &Database,
    table: UserTable,
    team_id: &str,
    user_id: &str,
) -> Result<Option<UserSecretRow>, EchoError> {
    let team_id = team_id.to_string();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT team_id, user_id, {v}, updated_at FROM {t}
                 WHERE team_id = ?1 AND user_id = ?2",
                t = table.name(),
                v = table.value_column(),
            ))?;
            let mut rows = stmt.query_map(params![team_id, user_id], |row| {
                Ok(UserSecretRow {
                    team_id: row.get(0)?,
                    user_id: row.get(1)?,
                    value: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn exists(
    db: &Database,
    table: UserTable,
    team_id: &str,
    user_id: &str,
) -> Result<bool, EchoError> {
    let team_id = team_id.to_string();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE team_id = ?1 AND user_id = ?2",
                    table.name()
                ),
                params![team_id, user_id],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Returns true when a row was removed.
pub async fn delete(
    db: &Database,
    table: UserTable,
    team_id: &str,
    user_id: &str,
) -> Result<bool, EchoError> {
    let team_id = team_id.to_string();
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                &format!(
                    "DELETE FROM {} WHERE team_id = ?1 AND user_id = ?2",
                    table.name()
                ),
                params![team_id, user_id],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Lists `(team_id, user_id)` pairs present in the table.
pub async fn list_keys(
    db: &Database,
    table: UserTable,
) -> Result<Vec<(String, String)>, EchoError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT team_id, user_id FROM {} ORDER BY team_id, user_id",
                table.name()
            ))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
