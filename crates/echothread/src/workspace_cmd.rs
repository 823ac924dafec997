// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `echothread workspace` admin subcommands.
//!
//! These manipulate the workspace store directly; a running `serve`
//! process rebuilds its registry from the same database on restart.

use std::sync::Arc;

use clap::Subcommand;
use echothread_core::types::Workspace;
use echothread_core::{EchoError, TeamId};
use echothread_storage::{db_path_from_env, Database, WorkspaceStore};
use echothread_vault::SecretBox;

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// Register a workspace, or update it when the team already exists.
    Add {
        /// Slack team id, e.g. T0123456789.
        team_id: String,
        /// Human-readable team name.
        team_name: String,
        /// Bot User OAuth token (xoxb-…).
        #[arg(long)]
        bot_token: String,
        /// App signing secret for webhook verification.
        #[arg(long)]
        signing_secret: String,
        /// App-level token for Socket Mode (xapp-…).
        #[arg(long)]
        app_token: Option<String>,
    },
    /// Remove a workspace permanently.
    Remove { team_id: String },
    /// List registered workspaces.
    List {
        /// Include deactivated workspaces.
        #[arg(long)]
        all: bool,
    },
    /// Activate or deactivate a workspace.
    Activate {
        team_id: String,
        /// Deactivate instead of activate.
        #[arg(long)]
        off: bool,
    },
    /// Run schema migrations explicitly (they also run on open).
    Migrate,
}

pub async fn run(command: WorkspaceCommand) -> Result<(), EchoError> {
    let sbox = Arc::new(SecretBox::from_env()?);
    let db = Database::open(&db_path_from_env()).await?;
    let store = WorkspaceStore::new(db, sbox);

    match command {
        WorkspaceCommand::Add {
            team_id,
            team_name,
            bot_token,
            signing_secret,
            app_token,
        } => {
            if !bot_token.starts_with("xoxb-") {
                return Err(EchoError::Config("bot token must start with 'xoxb-'".into()));
            }
            if let Some(ref app) = app_token {
                if !app.starts_with("xapp-") {
                    return Err(EchoError::Config("app token must start with 'xapp-'".into()));
                }
            }
            store
                .put(&Workspace {
                    team_id: TeamId(team_id.clone()),
                    team_name: team_name.clone(),
                    bot_token,
                    signing_secret,
                    app_token,
                    active: true,
                    created_at: String::new(),
                    updated_at: String::new(),
                })
                .await?;
            println!("workspace {team_id} ({team_name}) stored");
        }
        WorkspaceCommand::Remove { team_id } => {
            if store.delete(&team_id).await? {
                println!("workspace {team_id} removed");
            } else {
                println!("workspace {team_id} not found");
            }
        }
        WorkspaceCommand::List { all } => {
            let workspaces = store.list(!all).await?;
            if workspaces.is_empty() {
                println!("no workspaces registered");
            }
            for ws in workspaces {
                println!(
                    "{}\t{}\tactive={}\tsocket_mode={}\tupdated={}",
                    ws.team_id,
                    ws.team_name,
                    ws.active,
                    ws.app_token.is_some(),
                    ws.updated_at,
                );
            }
        }
        WorkspaceCommand::Activate { team_id, off } => {
            if store.set_active(&team_id, !off).await? {
                println!(
                    "workspace {team_id} {}",
                    if off { "deactivated" } else { "activated" }
                );
            } else {
                println!("workspace {team_id} not found");
            }
        }
        WorkspaceCommand::Migrate => {
            // Database::open above already ran the migrations.
            println!("migrations applied");
        }
    }
    Ok(())
}
