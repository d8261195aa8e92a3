pub mod models;
pub mod openai;

use openai::OpenAiProvider;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppConfig;
use models::{ChatResponse, Message};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Completion endpoint is not configured")]
    NotConfigured,
    #[error("Completion endpoint rejected the API key")]
    Unauthorized,
    #[error("Rate Limited")]
    RateLimited,
    #[error("Completion endpoint server error ({0})")]
    ServerError(u16),
    #[error("Completion response had no choices")]
    UnexpectedFormat,
    #[error("API Error: {0}")]
    Api(String),
    #[error("Network Error: {0}")]
    Network(String),
}

impl LlmError {
    /// Text suitable for showing to the person chatting.
    pub fn user_message(&self) -> String {
        match self {
            LlmError::NotConfigured => {
                "The assistant is not configured. Set an API key for the completion endpoint."
                    .to_string()
            }
            LlmError::Unauthorized => "The completion endpoint API key is invalid.".to_string(),
            LlmError::RateLimited => {
                "You have exceeded the request limit. Please try again later.".to_string()
            }
            LlmError::ServerError(_) => {
                "The completion service had an error. Please try again later.".to_string()
            }
            LlmError::Api(message) => message.clone(),
            LlmError::UnexpectedFormat | LlmError::Network(_) => {
                "Could not reach the assistant.".to_string()
            }
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a credential is present. `complete` fails with
    /// `NotConfigured` without touching the network when this is false.
    fn is_configured(&self) -> bool;

    /// Completes `text` given the already-trimmed `history`.
    async fn complete(&self, text: &str, history: &[Message]) -> Result<ChatResponse, LlmError>;
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_default(config: &AppConfig) -> Option<Arc<dyn CompletionClient>> {
        match config.llm.provider.as_str() {
            "openai" => {
                let cfg = config.llm.openai.as_ref()?;
                Some(Arc::new(OpenAiProvider::new(
                    cfg.clone(),
                    config.chat.system_prompt.clone(),
                )))
            }
            _ => None,
        }
    }
}
