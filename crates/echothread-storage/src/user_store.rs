// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable keyed store of per-user secrets: cookie jars and settings.

use std::sync::Arc;

use echothread_core::types::{UserCookies, UserSettings};
use echothread_core::{EchoError, TeamId, UserId};
use echothread_vault::SecretBox;
use tracing::info;

use crate::database::Database;
use crate::queries::users::{self, UserTable};

/// CRUD over `user_cookies` and `user_settings`, keyed by
/// `(team_id, user_id)`. Values are sealed blobs; the transcription engine
/// only ever reads through this store.
#[derive(Clone)]
pub struct UserSecretStore {
    db: Database,
    sbox: Arc<SecretBox>,
}

impl UserSecretStore {
    pub fn new(db: Database, sbox: Arc<SecretBox>) -> Self {
        Self { db, sbox }
    }

    /// Stores (or replaces) a user's cookie jar.
    pub async fn put_cookies(
        &self,
        team: &TeamId,
        user: &UserId,
        content: &[u8],
    ) -> Result<(), EchoError> {
        let sealed = self.sbox.seal(content)?;
        users::upsert(&self.db, UserTable::Cookies, &team.0, &user.0, sealed).await?;
        info!(team_id = %team, user_id = %user, "cookies stored");
        Ok(())
    }

    /// Returns the decrypted cookie jar, or `EchoError::Auth` when the
    /// sealed blob cannot be opened.
    pub async fn get_cookies(
        &self,
        team: &TeamId,
        user: &UserId,
    ) -> Result<Option<UserCookies>, EchoError> {
        match users::get(&self.db, UserTable::Cookies, &team.0, &user.0).await? {
            Some(row) => Ok(Some(UserCookies {
                team_id: TeamId(row.team_id),
                user_id: UserId(row.user_id),
                cookies: self.sbox.open(&row.value)?,
                updated_at: row.updated_at,
            })),
            None => Ok(None),
        }
    }

    pub async fn has_cookies(&self, team: &TeamId, user: &UserId) -> Result<bool, EchoError> {
        users::exists(&self.db, UserTable::Cookies, &team.0, &user.0).await
    }

    pub async fn delete_cookies(&self, team: &TeamId, user: &UserId) -> Result<bool, EchoError> {
        let removed = users::delete(&self.db, UserTable::Cookies, &team.0, &user.0).await?;
        if removed {
            info!(team_id = %team, user_id = %user, "cookies deleted");
        }
        Ok(removed)
    }

    /// Stores a user's settings map (recognized and unknown keys alike).
    pub async fn put_settings(
        &self,
        team: &TeamId,
        user: &UserId,
        settings: &UserSettings,
    ) -> Result<(), EchoError> {
        let json = serde_json::to_vec(&settings.settings).map_err(|e| EchoError::Storage {
            source: Box::new(e),
        })?;
        let sealed = self.sbox.seal(&json)?;
        users::upsert(&self.db, UserTable::Settings, &team.0, &user.0, sealed).await
    }

    /// Returns the user's settings, defaulting to empty when absent.
    pub async fn get_settings(
        &self,
        team: &TeamId,
        user: &UserId,
    ) -> Result<UserSettings, EchoError> {
        match users::get(&self.db, UserTable::Settings, &team.0, &user.0).await? {
            Some(row) => {
                let json = self.sbox.open(&row.value)?;
                let settings = serde_json::from_slice(&json).map_err(|e| EchoError::Storage {
                    source: Box::new(e),
                })?;
                Ok(UserSettings { settings })
            }
            None => Ok(UserSettings::default()),
        }
    }

    /// Lists every `(team_id, user_id)` with stored cookies.
    pub async fn list_cookie_keys(&self) -> Result<Vec<(String, String)>, EchoError> {
        users::list_keys(&self.db, UserTable::Cookies).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store() -> (UserSecretStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("users.db").to_str().unwrap())
            .await
            .unwrap();
        let sbox = Arc::new(SecretBox::from_passphrase("test key"));
        (UserSecretStore::new(db, sbox), dir)
    }

    fn team() -> TeamId {
        TeamId("T1".into())
    }

    fn user() -> UserId {
        UserId("U1".into())
    }

    #[tokio::test]
    async fn cookie_roundtrip() {
        let (store, _dir) = store().await;
        let jar = b"# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSID\tv\n";

        assert!(!store.has_cookies(&team(), &user()).await.unwrap());
        store.put_cookies(&team(), &user(), jar).await.unwrap();
        assert!(store.has_cookies(&team(), &user()).await.unwrap());

        let got = store.get_cookies(&team(), &user()).await.unwrap().unwrap();
        assert_eq!(got.cookies, jar);
        assert_eq!(got.team_id.0, "T1");
    }

    #[tokio::test]
    async fn cookies_are_scoped_per_team() {
        let (store, _dir) = store().await;
        store.put_cookies(&team(), &user(), b"jar-a").await.unwrap();
        store
            .put_cookies(&TeamId("T2".into()), &user(), b"jar-b")
            .await
            .unwrap();

        let a = store.get_cookies(&team(), &user()).await.unwrap().unwrap();
        let b = store
            .get_cookies(&TeamId("T2".into()), &user())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.cookies, b"jar-a");
        assert_eq!(b.cookies, b"jar-b");
    }

    #[tokio::test]
    async fn reupload_replaces_cookies() {
        let (store, _dir) = store().await;
        store.put_cookies(&team(), &user(), b"old").await.unwrap();
        store.put_cookies(&team(), &user(), b"new").await.unwrap();

        let got = store.get_cookies(&team(), &user()).await.unwrap().unwrap();
        assert_eq!(got.cookies, b"new");
        assert_eq!(store.list_cookie_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_cookies_removes_row() {
        let (store, _dir) = store().await;
        store.put_cookies(&team(), &user(), b"jar").await.unwrap();
        assert!(store.delete_cookies(&team(), &user()).await.unwrap());
        assert!(!store.delete_cookies(&team(), &user()).await.unwrap());
        assert!(store.get_cookies(&team(), &user()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settings_roundtrip_preserves_unknown_keys() {
        let (store, _dir) = store().await;
        let mut map = serde_json::Map::new();
        map.insert("preferred_language".into(), "ja".into());
        map.insert("future_flag".into(), serde_json::json!({"nested": 1}));
        let settings = UserSettings { settings: map };

        store.put_settings(&team(), &user(), &settings).await.unwrap();
        let got = store.get_settings(&team(), &user()).await.unwrap();

        assert_eq!(got.preferred_language(), Some("ja"));
        assert_eq!(
            got.settings.get("future_flag"),
            Some(&serde_json::json!({"nested": 1}))
        );
    }

    #[tokio::test]
    async fn missing_settings_default_to_empty() {
        let (store, _dir) = store().await;
        let got = store.get_settings(&team(), &user()).await.unwrap();
        assert!(got.settings.is_empty());
        assert!(got.allow_local_whisper());
    }
}
