//! Hardware sidecar entrypoint: probe devices, start the presence engine and
//! the voice coordinator on their own threads, then serve HTTP until a
//! shutdown signal arrives.
//!
//! Blocking HTTP clients (speech backends, dashboard sync) are built before
//! the async runtime exists and are only used from worker threads.

use anyhow::{Context, Result};
use hw_sidecar::api::{self, AppState};
use hw_sidecar::config::AppConfig;
use hw_sidecar::hardware::HardwareProfile;
use hw_sidecar::presence::PresenceEngine;
use hw_sidecar::voice::{DashboardNotifier, TranscriptOnly, VoiceBackends, VoiceCoordinator};
use hw_sidecar::{init_tracing, stt, tts};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hw-sidecar starting");

    let profile = HardwareProfile::probe(&config);
    let presence = Arc::new(PresenceEngine::start(
        config.presence_config(),
        profile.sensor,
        profile.edge,
    ));
    let backends = voice_backends(&config, profile.audio, profile.wake);
    let voice = Arc::new(VoiceCoordinator::start(config.voice_config(), backends));

    let state = AppState {
        presence: Arc::clone(&presence),
        voice: Arc::clone(&voice),
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    let served = runtime.block_on(serve(&config, state));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    shutdown_components(&voice, &presence);
    if let Err(err) = &served {
        tracing::error!(error = %err, "http server stopped with an error");
    }
    served
}

fn voice_backends(
    config: &AppConfig,
    device: Arc<dyn hw_sidecar::audio::AudioDevice>,
    wake: Option<Box<dyn hw_sidecar::wake::WakeWordModel>>,
) -> VoiceBackends {
    let stt = match stt::from_config(config) {
        Ok(stt) => stt,
        Err(err) => {
            tracing::warn!(error = %err, "speech-to-text unavailable");
            None
        }
    };
    let notifier = config.dashboard_url.as_deref().and_then(|url| {
        match DashboardNotifier::start(url, config.sync_api_key.clone()) {
            Ok(notifier) => Some(notifier),
            Err(err) => {
                tracing::warn!(error = %err, "dashboard sync disabled");
                None
            }
        }
    });
    VoiceBackends {
        device,
        wake,
        stt,
        tts: tts::from_config(config),
        responder: Box::new(TranscriptOnly),
        notifier,
    }
}

async fn serve(config: &AppConfig, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.bind, config.port))?;
    tracing::info!(addr = %listener.local_addr()?, "http server listening");
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Each component is stopped on its own; a panic in one does not skip the
/// other.
fn shutdown_components(voice: &VoiceCoordinator, presence: &PresenceEngine) {
    if catch_unwind(AssertUnwindSafe(|| voice.shutdown())).is_err() {
        tracing::error!("voice coordinator shutdown panicked");
    }
    if catch_unwind(AssertUnwindSafe(|| presence.shutdown())).is_err() {
        tracing::error!("presence engine shutdown panicked");
    }
    tracing::info!("hw-sidecar stopped");
}
