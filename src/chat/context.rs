use crate::db::models::{ChatMessage, Role};
use crate::llm::models::Message;

/// The last `window` messages, mapped onto the completion schema.
pub fn build_context(messages: &[ChatMessage], window: usize) -> Vec<Message> {
    let start = messages.len().saturating_sub(window);
    messages[start..].iter().map(to_completion_message).collect()
}

pub fn to_completion_message(message: &ChatMessage) -> Message {
    match message.role {
        Role::User => Message::user(message.body.as_str()),
        Role::Assistant => Message::assistant(message.body.as_str()),
    }
}
