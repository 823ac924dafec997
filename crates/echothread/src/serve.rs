// SPDX-FileCopyrightText: 2026 Echothread Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `echothread serve`: full wiring of stores, registries, engine, and the
//! inbound surfaces, plus graceful shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use echothread_config::EchoConfig;
use echothread_core::types::Command;
use echothread_core::{ChatLookup, EchoError, SpeechEngine};
use echothread_engine::{
    CommandRouter, RouterContext, StreamRegistry, StreamSettings, TranscriptionPool,
};
use echothread_gateway::GatewayState;
use echothread_media::YtDlpSource;
use echothread_slack::registry::WorkspaceRegistry;
use echothread_storage::{db_path_from_env, Database, UserSecretStore, WorkspaceStore};
use echothread_vault::SecretBox;
use echothread_whisper::{model_file_for, WhisperEngine};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Directory holding ggml model files, overridable for deployments that
/// mount models elsewhere.
const MODEL_DIR_ENV_VAR: &str = "WHISPER_MODEL_DIR";

/// How long shutdown waits for streams to drain before exiting anyway.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(15);

pub async fn run_serve(config_path: Option<&Path>, port: Option<u16>) -> Result<(), EchoError> {
    let config = echothread_config::load(config_path)?;
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "starting echothread serve");

    // The encryption key is loaded exactly once; missing is fatal.
    let sbox = Arc::new(SecretBox::from_env()?);

    let db_path = db_path_from_env();
    let db = Database::open(&db_path).await?;
    let workspace_store = WorkspaceStore::new(db.clone(), sbox.clone());
    let user_store = UserSecretStore::new(db, sbox);

    let cancel = install_signal_handler();
    let (command_tx, command_rx) = mpsc::channel::<Command>(256);

    let workspaces = Arc::new(
        WorkspaceRegistry::build(&workspace_store, command_tx.clone(), cancel.clone()).await?,
    );
    info!(count = workspaces.len().await, "workspace registry ready");

    let engine = load_speech_engine(&config)?;
    let pool = TranscriptionPool::with_defaults(engine);
    let settings = stream_settings(&config);
    let stream_registry = StreamRegistry::new(settings.linger);

    let router = CommandRouter::new(RouterContext {
        registry: stream_registry.clone(),
        chat: workspaces.clone() as Arc<dyn ChatLookup>,
        media: Arc::new(YtDlpSource::new(config.youtube.format.clone())),
        pool,
        users: user_store,
        settings,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });
    let router_cancel = cancel.clone();
    let router_handle = tokio::spawn(async move { router.run(command_rx, router_cancel).await });

    // Gateway: health endpoint + signed webhooks.
    let gateway_state = GatewayState {
        command_tx,
        workspaces: workspaces.clone(),
        active_streams: {
            let registry = stream_registry.clone();
            Arc::new(move || registry.active_count())
        },
    };
    let host = config.server.host.clone();
    let gateway_port = port.unwrap_or(config.server.port);
    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = echothread_gateway::start_server(&host, gateway_port, gateway_state).await
        {
            tracing::error!(error = %e, "gateway server exited");
        }
    });

    // Run until a shutdown signal arrives.
    cancel.cancelled().await;
    info!("shutdown signal received, draining streams");

    let stopped = stream_registry.stop_all();
    if stopped > 0 {
        info!(count = stopped, "waiting for streams to drain");
        let drain = async {
            for controller in stream_registry.live_controllers() {
                controller.wait_terminal().await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
            warn!("drain deadline reached, exiting with streams interrupted");
        }
    }

    gateway_handle.abort();
    let _ = router_handle.await;
    info!("echothread serve shutdown complete");
    Ok(())
}

/// Loads the Whisper model named by the configuration.
fn load_speech_engine(config: &EchoConfig) -> Result<Arc<dyn SpeechEngine>, EchoError> {
    let model_dir = std::env::var(MODEL_DIR_ENV_VAR).unwrap_or_else(|_| "models".to_string());
    let model_path = model_file_for(Path::new(&model_dir), &config.whisper.model);
    let engine = WhisperEngine::load(&model_path, config.whisper.uses_gpu())?;
    Ok(Arc::new(engine))
}

/// Maps file configuration onto the engine's per-stream settings.
fn stream_settings(config: &EchoConfig) -> StreamSettings {
    let mut settings = StreamSettings::default();
    settings.aggressiveness = config.vad.aggressiveness;
    settings.segmenter.frame_ms = config.vad.frame_ms;
    settings.segmenter.silence_report_ms = config.vad.flush_silence_ms;
    settings.assembler.flush_silence_ms = config.vad.flush_silence_ms;
    settings.assembler.soft_len = config.vad.soft_len;
    settings.assembler.hard_len = config.vad.hard_len;
    settings.include_timestamps = config.slack.include_timestamps;
    settings
}

/// Installs SIGTERM/SIGINT handlers; the returned token fires on either.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    token_clone.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, initiating shutdown"),
                _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

/// Initializes the tracing subscriber once.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("echothread=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
