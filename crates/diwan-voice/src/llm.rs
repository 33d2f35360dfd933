use crate::config::LlmConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reply used whenever generation fails for any reason.
pub const FALLBACK_RESPONSE: &str = "عذرًا يا فندم، حصل خطأ بسيط في النظام. ممكن تعيد سؤالك؟";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Produces the assistant's reply to one user utterance.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Never fails: implementations log the error and return
    /// [`FALLBACK_RESPONSE`] instead.
    async fn generate(&self, prompt: &str) -> String;
}

/// Gemini `generateContent` over REST.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiGenerator {
    pub fn new(config: LlmConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Wraps the user's words in the customer-service persona.
    pub fn build_prompt(&self, user_text: &str) -> String {
        format!(
            "{}\n\nالعميل قال: {}\n\nرد الموظف:",
            self.config.system_prompt.trim(),
            user_text
        )
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn try_generate(&self, user_text: &str) -> Result<String, VoiceError> {
        if self.config.api_key.is_empty() {
            return Err(VoiceError::Config("Gemini API key is not configured".to_string()));
        }

        let prompt = self.build_prompt(user_text);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Llm(format!("request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| VoiceError::Llm(format!("Gemini returned an error: {}", e)))?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Llm(format!("malformed response: {}", e)))?;

        let text = response_text(parsed);
        if text.is_empty() {
            return Err(VoiceError::Llm("response contained no text".to_string()));
        }
        Ok(text)
    }
}

/// Joins the text parts of every candidate, trimmed.
fn response_text(response: GenerateResponse) -> String {
    let text = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .map(|p| p.text)
        .collect::<String>();
    text.trim().to_string()
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> String {
        match self.try_generate(prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(model = %self.config.model, "text generation failed: {}", e);
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}
