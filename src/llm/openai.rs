use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error};

use crate::config::{OpenAiConfig, PLACEHOLDER_API_KEY};
use crate::llm::{
    models::{ChatResponse, CompletionRequest, Message, Usage},
    CompletionClient, LlmError,
};

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    system_prompt: String,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig, system_prompt: String) -> Self {
        Self {
            client: Client::new(),
            config,
            system_prompt,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        let key = self.config.api_key.trim();
        !key.is_empty() && key != PLACEHOLDER_API_KEY && !self.config.api_base.is_empty()
    }

    async fn complete(&self, text: &str, history: &[Message]) -> Result<ChatResponse, LlmError> {
        if !self.is_configured() {
            error!("Completion API key is not configured");
            return Err(LlmError::NotConfigured);
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_prompt.as_str()));
        messages.extend_from_slice(history);
        messages.push(Message::user(text));

        let body = CompletionRequest {
            model: &self.config.default_model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(model = %self.config.default_model, history = history.len(), "Requesting completion");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.trim())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let content = json["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or(LlmError::UnexpectedFormat)?
            .to_string();

        let usage = json.get("usage").map(|u| {
            let input_tokens = token_count(&u["prompt_tokens"]);
            let output_tokens = token_count(&u["completion_tokens"]);
            Usage {
                input_tokens,
                output_tokens,
                total_tokens: match u.get("total_tokens") {
                    Some(total) => token_count(total),
                    None => input_tokens.saturating_add(output_tokens),
                },
            }
        });

        let model = json["model"]
            .as_str()
            .unwrap_or(&self.config.default_model)
            .to_string();

        Ok(ChatResponse {
            content,
            model,
            usage,
        })
    }
}

// Counts beyond u32 saturate rather than wrap.
fn token_count(value: &serde_json::Value) -> u32 {
    value
        .as_u64()
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

fn classify_failure(status: StatusCode, body: &str) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED => LlmError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited,
        s if s.is_server_error() => LlmError::ServerError(s.as_u16()),
        s => {
            let detail = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string));
            LlmError::Api(detail.unwrap_or_else(|| format!("OpenAI Error {}: {}", s, body)))
        }
    }
}
