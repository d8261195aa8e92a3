use serde::{Deserialize, Serialize};

use crate::db::models::ChatMessage;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    Message { content: String },
    Clear,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    Messages { messages: Vec<ChatMessage> },
    Composing { composing: bool },
    Error { content: String },
}
