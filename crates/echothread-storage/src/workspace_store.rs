// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable keyed store of workspace records with sealed credentials.

use std::sync::Arc;

use echothread_core::types::Workspace;
use echothread_core::EchoError;
use echothread_vault::SecretBox;
use tracing::info;

use crate::database::Database;
use crate::models::WorkspaceRow;
use crate::queries::workspaces;

/// CRUD over the `workspaces` table. Secrets never leave this store
/// decrypted except inside the returned [`Workspace`] views.
#[derive(Clone)]
pub struct WorkspaceStore {
    db: Database,
    sbox: Arc<SecretBox>,
}

impl WorkspaceStore {
    pub fn new(db: Database, sbox: Arc<SecretBox>) -> Self {
        Self { db, sbox }
    }

    /// Upserts a workspace, sealing its credential fields.
    pub async fn put(&self, workspace: &Workspace) -> Result<(), EchoError> {
        let row = WorkspaceRow {
            team_id: workspace.team_id.0.clone(),
            team_name: workspace.team_name.clone(),
            bot_token: self.sbox.seal_str(&workspace.bot_token)?,
            signing_secret: self.sbox.seal_str(&workspace.signing_secret)?,
            app_token: workspace
                .app_token
                .as_deref()
                .map(|t| self.sbox.seal_str(t))
                .transpose()?,
            active: workspace.active,
            created_at: workspace.created_at.clone(),
            updated_at: workspace.updated_at.clone(),
        };
        workspaces::upsert(&self.db, row).await?;
        info!(team_id = %workspace.team_id, team_name = %workspace.team_name, "workspace stored");
        Ok(())
    }

    /// Returns the decrypted workspace, or `EchoError::Auth` if any sealed
    /// field fails to open.
    pub async fn get(&self, team_id: &str) -> Result<Option<Workspace>, EchoError> {
        match workspaces::get(&self.db, team_id).await? {
            Some(row) => Ok(Some(self.decrypt(row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<Workspace>, EchoError> {
        let rows = workspaces::list(&self.db, active_only).await?;
        rows.into_iter().map(|row| self.decrypt(row)).collect()
    }

    pub async fn delete(&self, team_id: &str) -> Result<bool, EchoError> {
        let removed = workspaces::delete(&self.db, team_id).await?;
        if removed {
            info!(team_id, "workspace removed");
        }
        Ok(removed)
    }

    pub async fn set_active(&self, team_id: &str, active: bool) -> Result<bool, EchoError> {
        let updated = workspaces::set_active(&self.db, team_id, active).await?;
        if updated {
            info!(team_id, active, "workspace active flag updated");
        }
        Ok(updated)
    }

    pub async fn has_any(&self) -> Result<bool, EchoError> {
        workspaces::has_any(&self.db).await
    }

    fn decrypt(&self, row: WorkspaceRow) -> Result<Workspace, EchoError> {
        Ok(Workspace {
            team_id: echothread_core::TeamId(row.team_id),
            team_name: row.team_name,
            bot_token: self.sbox.open_str(&row.bot_token)?,
            signing_secret: self.sbox.open_str(&row.signing_secret)?,
            app_token: row
                .app_token
                .as_deref()
                .map(|t| self.sbox.open_str(t))
                .transpose()?,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
