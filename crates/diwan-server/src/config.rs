//! Server configuration loading from file and environment variables.

use diwan_rtc::DEFAULT_ICE_SERVERS;
use diwan_voice::VoiceConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Peer connection settings.
    #[serde(default)]
    pub rtc: RtcConfig,

    /// Inference collaborators and artifact locations.
    #[serde(default)]
    pub voice: VoiceConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding `index.html` for `GET /ui`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Upper bound on closing every live connection at shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "diwan_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Peer connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RtcConfig {
    /// STUN/TURN URIs handed to every new peer connection, in order.
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ice_servers() -> Vec<String> {
    DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `DIWAN_HOST` overrides `server.host`
/// - `DIWAN_PORT` overrides `server.port`
/// - `DIWAN_LOG_LEVEL` overrides `logging.level`
/// - `DIWAN_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `DIWAN_ICE_SERVERS` overrides `rtc.ice_servers` (comma separated)
/// - `DIWAN_TEMP_DIR` overrides `voice.temp_dir`
/// - `DIWAN_REFERENCE_WAV` overrides `voice.reference_wav`
/// - `DIWAN_GEMINI_API_KEY` overrides `voice.llm.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("DIWAN_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("DIWAN_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = var("DIWAN_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("DIWAN_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(servers) = var("DIWAN_ICE_SERVERS") {
        config.rtc.ice_servers = servers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(dir) = var("DIWAN_TEMP_DIR") {
        config.voice.temp_dir = PathBuf::from(dir);
    }
    if let Some(wav) = var("DIWAN_REFERENCE_WAV") {
        config.voice.reference_wav = PathBuf::from(wav);
    }
    if let Some(key) = var("DIWAN_GEMINI_API_KEY") {
        config.voice.llm.api_key = key;
    }
}
