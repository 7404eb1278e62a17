use std::time::Duration;

use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ImageMime};
use llm::error::LLMError;
use thiserror::Error;

use castcheck_core::{AiSettings, ConfigError};

use crate::prompt::PromptPayload;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model service unavailable: {0}")]
    Unavailable(String),

    #[error("model credentials rejected: {0}")]
    Auth(String),

    #[error("model did not answer within {}s", .0.as_secs())]
    Timeout(Duration),
}

/// The external generative model, reduced to one call.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short label for logs, e.g. `google/gemini-2.5-flash`.
    fn describe(&self) -> String;

    /// One attempt, no retries. Returns the raw reply text.
    async fn send(&self, payload: &PromptPayload) -> Result<String, ModelError>;
}

fn map_backend(provider: &str) -> Result<LLMBackend, ConfigError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
}

/// Transport errors carry the HTTP status in their text; 401/403 mean the
/// credential was refused.
fn classify(err: LLMError) -> ModelError {
    match err {
        LLMError::AuthError(msg) => ModelError::Auth(msg),
        other => {
            let msg = other.to_string();
            let lower = msg.to_lowercase();
            if lower.contains("401")
                || lower.contains("403")
                || lower.contains("unauthorized")
                || lower.contains("api key not valid")
            {
                ModelError::Auth(msg)
            } else {
                ModelError::Unavailable(msg)
            }
        }
    }
}

/// Production client backed by the `llm` crate.
pub struct LlmModelClient {
    settings: AiSettings,
}

impl LlmModelClient {
    pub fn new(settings: AiSettings) -> Result<Self, ConfigError> {
        map_backend(&settings.provider)?;
        Ok(Self { settings })
    }
}

#[async_trait]
impl ModelClient for LlmModelClient {
    fn describe(&self) -> String {
        format!("{}/{}", self.settings.provider, self.settings.model)
    }

    async fn send(&self, payload: &PromptPayload) -> Result<String, ModelError> {
        let backend = map_backend(&self.settings.provider)
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&self.settings.model)
            .system(&payload.system)
            .temperature(0.0);

        if !self.settings.api_key.is_empty() {
            builder = builder.api_key(&self.settings.api_key);
        }

        let llm = builder.build().map_err(classify)?;

        let mime = match payload.image.mime {
            "image/jpeg" => ImageMime::JPEG,
            _ => ImageMime::PNG,
        };
        let messages = vec![
            ChatMessage::user().content(&payload.user).build(),
            ChatMessage::user()
                .image(mime, payload.image.bytes.clone())
                .build(),
        ];

        let timeout = self.settings.timeout();
        let response = tokio::time::timeout(timeout, llm.chat(&messages))
            .await
            .map_err(|_| ModelError::Timeout(timeout))?
            .map_err(classify)?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            Some(_) => Err(ModelError::Unavailable("model returned empty text".to_string())),
            None => Err(ModelError::Unavailable("model returned no text".to_string())),
        }
    }
}
