//! Inference collaborators for the Diwan voice assistant.
//!
//! Each stage of a conversation turn sits behind a small trait so the
//! signaling server can be driven by fakes in tests:
//!
//! - [`SpeechToText`]: audio bytes in, transcript out ([`SttService`] runs a
//!   whisper.cpp binary).
//! - [`TextGenerator`]: user text in, reply out. Never fails; errors collapse
//!   into [`FALLBACK_RESPONSE`] ([`GeminiGenerator`] calls the Gemini REST API).
//! - [`TextToSpeech`]: text plus a reference voice in, a WAV file out
//!   ([`TtsService`] runs a Coqui `tts` CLI).

pub mod config;
pub mod error;
pub mod llm;
pub mod stt;
pub mod tts;

pub use config::{LlmConfig, SttConfig, TtsConfig, VoiceConfig};
pub use error::VoiceError;
pub use llm::{GeminiGenerator, TextGenerator, FALLBACK_RESPONSE};
pub use stt::{SpeechToText, SttService};
pub use tts::{TextToSpeech, TtsService};
