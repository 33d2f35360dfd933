use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_SYSTEM_PROMPT: &str = "تخيل إنك موظف خدمة عملاء مصري ودود بيتكلم باللهجة المصرية الطبيعية، \
بترد باحترام وبلُطف على العميل، ومبتستخدمش فصحى رسمية. \
خلي إجابتك بسيطة، قريبة من كلام الناس العادي، وماتطولش. \
حط تشكيل في اللزوم للنطق ومتحطش علامات ترقيم";

const DEFAULT_TTS_MODEL_DIR: &str = "/root/.local/share/tts/tts_models--ar--custom--egtts_v0.1";

fn default_language() -> String {
    "ar".to_string()
}

fn default_reference_wav() -> PathBuf {
    PathBuf::from("/app/ref.wav")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Settings shared by the inference collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Language code passed to STT and TTS.
    #[serde(default = "default_language")]
    pub language: String,

    /// Reference recording the synthesized voice is cloned from.
    #[serde(default = "default_reference_wav")]
    pub reference_wav: PathBuf,

    /// Directory for synthesized artifacts.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    #[serde(default)]
    pub stt: SttConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            reference_wav: default_reference_wav(),
            temp_dir: default_temp_dir(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

fn default_stt_binary() -> PathBuf {
    PathBuf::from("whisper-cli")
}

fn default_stt_model() -> PathBuf {
    PathBuf::from("models/ggml-medium.bin")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_stt_binary")]
    pub binary_path: PathBuf,
    #[serde(default = "default_stt_model")]
    pub model_path: PathBuf,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            binary_path: default_stt_binary(),
            model_path: default_stt_model(),
        }
    }
}

fn default_tts_binary() -> PathBuf {
    PathBuf::from("tts")
}

fn default_tts_model() -> PathBuf {
    PathBuf::from(DEFAULT_TTS_MODEL_DIR)
}

fn default_tts_config() -> PathBuf {
    PathBuf::from(DEFAULT_TTS_MODEL_DIR).join("config.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_binary")]
    pub binary_path: PathBuf,
    #[serde(default = "default_tts_model")]
    pub model_path: PathBuf,
    #[serde(default = "default_tts_config")]
    pub config_path: PathBuf,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            binary_path: default_tts_binary(),
            model_path: default_tts_model(),
            config_path: default_tts_config(),
        }
    }
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_llm_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Gemini API key. Usually supplied via `DIWAN_GEMINI_API_KEY`.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key: String::new(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_api_key() {
        let config = LlmConfig {
            api_key: "super-secret".to_string(),
            ..Default::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: VoiceConfig = toml::from_str(
            r#"
            language = "en"

            [tts]
            binary_path = "/opt/coqui/bin/tts"
            "#,
        )
        .unwrap();

        assert_eq!(config.language, "en");
        assert_eq!(config.tts.binary_path, PathBuf::from("/opt/coqui/bin/tts"));
        assert_eq!(config.tts.config_path, default_tts_config());
        assert_eq!(config.stt.binary_path, PathBuf::from("whisper-cli"));
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert!(config.llm.api_key.is_empty());
    }

    #[test]
    fn api_key_is_never_serialized() {
        let config = LlmConfig {
            api_key: "super-secret".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
