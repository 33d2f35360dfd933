//! Diwan server binary.
//!
//! Starts an axum HTTP server with structured logging, builds the WebRTC
//! factory and inference collaborators once, and on SIGTERM/SIGINT closes
//! every live peer connection before draining the HTTP server.

use diwan_rtc::WebRtcFactory;
use diwan_server::config::{self, Config};
use diwan_server::{app, AppState, ConnectionRegistry};
use diwan_voice::{GeminiGenerator, SttService, TtsService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("DIWAN_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the server cannot start without valid config");

    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );
    tracing::debug!(?config, "effective configuration");

    if !config.voice.reference_wav.exists() {
        tracing::warn!(
            path = %config.voice.reference_wav.display(),
            "voice reference not found; speech synthesis will fail until it exists"
        );
    }

    let factory = WebRtcFactory::new(config.rtc.ice_servers.clone())
        .expect("failed to initialize the WebRTC media engine");
    let llm = GeminiGenerator::new(config.voice.llm.clone())
        .expect("failed to build the text generation client");
    if config.voice.llm.api_key.is_empty() {
        tracing::warn!("no Gemini API key configured; replies will use the fallback text");
    }

    let registry = ConnectionRegistry::new();
    let state = AppState {
        factory: Arc::new(factory),
        stt: Arc::new(SttService::from_config(&config.voice.stt)),
        llm: Arc::new(llm),
        tts: Arc::new(TtsService::from_config(
            &config.voice.tts,
            config.voice.language.clone(),
        )),
        registry: registry.clone(),
        language: config.voice.language.clone(),
        voice_reference: config.voice.reference_wav.clone(),
        temp_dir: config.voice.temp_dir.clone(),
        static_dir: config.server.static_dir.clone(),
    };

    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting diwan server; UI at /ui");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    // Open signaling sockets would hold graceful shutdown forever, so the
    // registry is closed first; that also ends every socket loop.
    let shutdown_timeout = config.server.shutdown_timeout();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let failures = registry.shutdown(shutdown_timeout).await;
            if failures > 0 {
                tracing::warn!(failures, "some connections did not close cleanly");
            }
        })
        .await
        .expect("server error");

    tracing::info!("diwan server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
