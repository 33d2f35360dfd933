//! Diwan signaling server.
//!
//! Serves the browser UI, a health probe, and the `/ws` signaling socket that
//! negotiates a WebRTC peer connection per browser tab and runs the
//! transcribe -> generate -> synthesize loop over it.

pub mod client;
pub mod config;
pub mod registry;
pub mod session;
pub mod signaling;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Extension, Json, Router,
};
use diwan_rtc::PeerConnectionFactory;
use diwan_voice::{SpeechToText, TextGenerator, TextToSpeech};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use client::ClientChannel;
pub use registry::ConnectionRegistry;
pub use session::{ConversationSession, SessionError, SpeechSettings};
pub use signaling::{ConnectionState, SignalingConnection, SignalingError};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Builds one peer connection per accepted offer.
    pub factory: Arc<dyn PeerConnectionFactory>,
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn TextGenerator>,
    pub tts: Arc<dyn TextToSpeech>,
    /// Every live peer connection, for failure cleanup and shutdown.
    pub registry: ConnectionRegistry,
    /// Language code handed to speech-to-text.
    pub language: String,
    /// Recording the assistant's voice is cloned from.
    pub voice_reference: PathBuf,
    /// Directory for synthesized artifacts.
    pub temp_dir: PathBuf,
    /// Directory holding the browser UI.
    pub static_dir: PathBuf,
}

impl AppState {
    pub fn speech_settings(&self) -> SpeechSettings {
        SpeechSettings {
            tts: self.tts.clone(),
            voice_reference: self.voice_reference.clone(),
            temp_dir: self.temp_dir.clone(),
        }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": diwan_types::SERVICE_NAME,
    }))
}

/// `GET /ui`: the single-page browser client.
async fn ui(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!(path = %path.display(), "failed to read UI page: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h1>Error: index.html not found</h1>"),
            )
                .into_response()
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/ui", get(ui))
        .route("/ws", get(signaling::ws_handler));

    let router = if state.static_dir.is_dir() {
        tracing::info!(path = %state.static_dir.display(), "serving static assets at /static");
        router.nest_service("/static", ServeDir::new(&state.static_dir))
    } else {
        tracing::info!(
            path = %state.static_dir.display(),
            "static directory not found, skipping asset serving"
        );
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
