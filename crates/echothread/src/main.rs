// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! echothread: live-stream transcription into Slack threads.
//!
//! Binary entry point: `serve` runs the bot, `create-config` writes a
//! starter configuration, and `workspace` manages registered workspaces.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod serve;
mod workspace_cmd;

/// Live-stream transcription bot posting sentences into Slack threads.
#[derive(Parser, Debug)]
#[command(name = "echothread", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bot: webhook server, Socket Mode, and the engine.
    Serve {
        /// Path to the configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the configured server port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write a commented default configuration file.
    CreateConfig {
        /// Destination path.
        #[arg(default_value = "echothread.toml")]
        path: PathBuf,
    },
    /// Manage registered Slack workspaces.
    Workspace {
        #[command(subcommand)]
        command: workspace_cmd::WorkspaceCommand,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, port } => serve::run_serve(config.as_deref(), port).await,
        Commands::CreateConfig { path } => create_config(&path),
        Commands::Workspace { command } => workspace_cmd::run(command).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn create_config(path: &std::path::Path) -> Result<(), echothread_core::EchoError> {
    use echothread_core::EchoError;
    if path.exists() {
        return Err(EchoError::Config(format!(
            "{} already exists; refusing to overwrite",
            path.display()
        )));
    }
    std::fs::write(path, echothread_config::default_config_toml())
        .map_err(|e| EchoError::Config(format!("cannot write {}: {e}", path.display())))?;
    println!("wrote {}", path.display());
    Ok(())
}
