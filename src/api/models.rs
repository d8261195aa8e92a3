use serde::{Deserialize, Serialize};

use crate::db::models::ChatMessage;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message: ChatMessage,
    pub reply: ChatMessage,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// The apology shown in place of a reply, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ChatMessage>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reply: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub authenticated: bool,
    pub ready: bool,
    pub composing: bool,
}
