// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime cache mapping `team_id -> SlackClient`.
//!
//! Built from the workspace store at boot and rebuilt incrementally on
//! admin mutations. Single-workspace deployments use the same mechanism
//! with the synthetic `_default_` key backed by environment variables.
//! The registry also owns one Socket Mode task per workspace that declares
//! an app token.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use echothread_core::traits::chat::ChatLookup;
use echothread_core::types::{Command, Workspace};
use echothread_core::{ChatPoster, EchoError, TeamId};
use echothread_storage::WorkspaceStore;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{socket, SlackClient};

struct WorkspaceEntry {
    client: SlackClient,
    active: bool,
    socket_cancel: Option<CancellationToken>,
}

/// Registry of per-workspace chat clients.
pub struct WorkspaceRegistry {
    entries: RwLock<HashMap<String, WorkspaceEntry>>,
    command_tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl WorkspaceRegistry {
    /// Builds the registry from the store, falling back to
    /// `SLACK_BOT_TOKEN` / `SLACK_SIGNING_SECRET` / `SLACK_APP_TOKEN` when
    /// no workspaces are registered.
    pub async fn build(
        store: &WorkspaceStore,
        command_tx: mpsc::Sender<Command>,
        cancel: CancellationToken,
    ) -> Result<Self, EchoError> {
        let registry = Self {
            entries: RwLock::new(HashMap::new()),
            command_tx,
            cancel,
        };

        let workspaces = store.list(false).await?;
        if workspaces.is_empty() {
            match env_fallback_workspace() {
                Some(ws) => {
                    info!("no registered workspaces; using environment fallback");
                    registry.insert(&ws).await?;
                }
                None => {
                    return Err(EchoError::Config(
                        "no workspaces registered and SLACK_BOT_TOKEN is not set; \
                         add a workspace or configure the environment fallback"
                            .into(),
                    ));
                }
            }
        } else {
            for ws in &workspaces {
                if let Err(e) = registry.insert(ws).await {
                    warn!(team_id = %ws.team_id, error = %e, "skipping workspace");
                }
            }
        }
        Ok(registry)
    }

    /// Inserts or replaces a workspace entry, (re)starting its Socket Mode
    /// task when an app token is present and the workspace is active.
    pub async fn insert(&self, workspace: &Workspace) -> Result<(), EchoError> {
        let client = SlackClient::new(
            &workspace.bot_token,
            &workspace.signing_secret,
            workspace.app_token.as_deref(),
        )?;

        let socket_cancel = if workspace.active && workspace.app_token.is_some() {
            let token = self.cancel.child_token();
            tokio::spawn(socket::run(
                client.clone(),
                workspace.team_id.clone(),
                self.command_tx.clone(),
                token.clone(),
            ));
            Some(token)
        } else {
            None
        };

        let mut entries = self.entries.write().await;
        if let Some(old) = entries.insert(
            workspace.team_id.0.clone(),
            WorkspaceEntry {
                client,
                active: workspace.active,
                socket_cancel,
            },
        ) {
            if let Some(cancel) = old.socket_cancel {
                cancel.cancel();
            }
        }
        info!(team_id = %workspace.team_id, active = workspace.active, "workspace registered");
        Ok(())
    }

    /// Removes a workspace and stops its socket task.
    pub async fn remove(&self, team_id: &TeamId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.remove(&team_id.0) {
            Some(entry) => {
                if let Some(cancel) = entry.socket_cancel {
                    cancel.cancel();
                }
                info!(team_id = %team_id, "workspace unregistered");
                true
            }
            None => false,
        }
    }

    /// Flips the active flag. Inactive workspaces stop receiving new work;
    /// already-running streams keep their client handle and finish.
    pub async fn set_active(&self, team_id: &TeamId, active: bool) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&team_id.0) {
            Some(entry) => {
                entry.active = active;
                if !active {
                    if let Some(cancel) = entry.socket_cancel.take() {
                        cancel.cancel();
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Returns the client for `team_id`. Unknown teams fall back to the
    /// `_default_` entry when present (single-workspace mode).
    pub async fn get(&self, team_id: &TeamId) -> Option<SlackClient> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(&team_id.0)
            .or_else(|| entries.get(echothread_core::types::DEFAULT_TEAM_ID))?;
        entry.active.then(|| entry.client.clone())
    }

    /// The signing secret used to verify inbound webhooks for `team_id`.
    pub async fn signing_secret_for(&self, team_id: &TeamId) -> Option<String> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(&team_id.0)
            .or_else(|| entries.get(echothread_core::types::DEFAULT_TEAM_ID))?;
        Some(entry.client.signing_secret().to_string())
    }

    /// Number of registered workspaces.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ChatLookup for WorkspaceRegistry {
    async fn poster_for(&self, team: &TeamId) -> Option<Arc<dyn ChatPoster>> {
        self.get(team)
            .await
            .map(|client| Arc::new(client) as Arc<dyn ChatPoster>)
    }
}

/// Reads the single-workspace fallback credentials from the environment.
fn env_fallback_workspace() -> Option<Workspace> {
    let bot_token = std::env::var("SLACK_BOT_TOKEN").ok().filter(|t| !t.is_empty())?;
    let signing_secret = std::env::var("SLACK_SIGNING_SECRET").unwrap_or_default();
    let app_token = std::env::var("SLACK_APP_TOKEN").ok().filter(|t| !t.is_empty());
    Some(Workspace {
        team_id: TeamId::default_team(),
        team_name: "default".to_string(),
        bot_token,
        signing_secret,
        app_token,
        active: true,
        created_at: String::new(),
        updated_at: String::new(),
    })
}
