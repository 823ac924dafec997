// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations plus the legacy single-workspace upgrade.
//!
//! SQL migration files are compiled into the binary via `embed_migrations!`
//! and tracked by refinery in its own history table. The legacy upgrade runs
//! first and in code, because it must inspect the shape of tables created by
//! the pre-multiworkspace tool.

use rusqlite::Connection;
use tracing::info;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Runs all pending embedded migrations.
pub fn run_migrations(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    embedded::migrations::runner().run(conn).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Null,
            format!("migration failed: {e}").into(),
        )
    })?;
    Ok(())
}

/// Upgrades tables created by the single-workspace schema: rows lacking a
/// `team_id` column are rebuilt with `team_id` defaulted to `_default_` and
/// a composite primary key.
///
/// Idempotent: a table that already carries `team_id` is left untouched, so
/// running this any number of times yields the same schema and row counts.
/// Must complete before any other operation proceeds.
pub fn apply_legacy_migration(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    upgrade_user_table(conn, "user_cookies", "cookies")?;
    upgrade_user_table(conn, "user_settings", "settings")?;
    Ok(())
}

fn upgrade_user_table(
    conn: &mut Connection,
    table: &str,
    value_column: &str,
) -> Result<(), rusqlite::Error> {
    if !table_exists(conn, table)? || has_column(conn, table, "team_id")? {
        return Ok(());
    }

    info!(table, "upgrading legacy single-workspace table");
    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "CREATE TABLE {table}_new (
             team_id    TEXT NOT NULL DEFAULT '_default_',
             user_id    TEXT NOT NULL,
             {value_column} BLOB NOT NULL,
             created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
             updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
             PRIMARY KEY (team_id, user_id)
         );
         INSERT INTO {table}_new (team_id, user_id, {value_column})
             SELECT '_default_', user_id, {value_column} FROM {table};
         DROP TABLE {table};
         ALTER TABLE {table}_new RENAME TO {table};"
    ))?;
    tx.commit()
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE user_cookies (
                 user_id TEXT PRIMARY KEY,
                 cookies BLOB NOT NULL,
                 created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                 updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
             );
             INSERT INTO user_cookies (user_id, cookies) VALUES ('U1', x'01'), ('U2', x'02');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn legacy_rows_get_default_team() {
        let mut conn = legacy_db();
        apply_legacy_migration(&mut conn).unwrap();

        let teams: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT team_id FROM user_cookies ORDER BY user_id")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap()
        };
        assert_eq!(teams, vec!["_default_", "_default_"]);
    }

    #[test]
    fn migration_is_idempotent() {
        let mut conn = legacy_db();
        apply_legacy_migration(&mut conn).unwrap();

        let count_before: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_cookies", [], |r| r.get(0))
            .unwrap();
        let schema_before: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = 'user_cookies'",
                [],
                |r| r.get(0),
            )
            .unwrap();

        apply_legacy_migration(&mut conn).unwrap();

        let count_after: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_cookies", [], |r| r.get(0))
            .unwrap();
        let schema_after: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = 'user_cookies'",
                [],
                |r| r.get(0),
            )
            .unwrap();

        assert_eq!(count_before, count_after);
        assert_eq!(schema_before, schema_after);
    }

    #[test]
    fn fresh_database_is_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();
        // No user tables at all: nothing to upgrade.
        apply_legacy_migration(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        // Re-running both is fine.
        apply_legacy_migration(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
    }

    #[test]
    fn migrated_table_accepts_multiple_teams_per_user() {
        let mut conn = legacy_db();
        apply_legacy_migration(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO user_cookies (team_id, user_id, cookies) VALUES ('T9', 'U1', x'03')",
            [],
        )
        .unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM user_cookies WHERE user_id = 'U1'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}
