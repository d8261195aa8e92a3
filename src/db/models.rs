use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const STORE_TIMESTAMP_PARSE: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Error,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Error => "error",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "error" => Ok(MessageStatus::Error),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// One entry of a conversation. `id` is only ever set by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub owner_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub role: Role,
    pub status: MessageStatus,
}

impl ChatMessage {
    /// A local entry stamped with the current time and no id.
    pub fn new(owner_id: &str, body: &str, role: Role, status: MessageStatus) -> Self {
        Self {
            id: None,
            owner_id: owner_id.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
            role,
            status,
        }
    }
}

/// A saved copy of a whole conversation, kept apart from the live history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<String>,
    pub owner_id: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub title: Option<String>,
}

impl Conversation {
    /// Dates come from the first and last message; an empty conversation
    /// is stamped with the current time.
    pub fn from_messages(owner_id: &str, mut messages: Vec<ChatMessage>, title: Option<String>) -> Self {
        sort_by_sent_at(&mut messages);
        let now = Utc::now();
        Self {
            id: None,
            owner_id: owner_id.to_string(),
            created_at: messages.first().map_or(now, |m| m.sent_at),
            last_activity: messages.last().map_or(now, |m| m.sent_at),
            messages,
            title: title.filter(|t| !t.trim().is_empty()),
        }
    }
}

pub fn sort_by_sent_at(messages: &mut [ChatMessage]) {
    messages.sort_by_key(|m| m.sent_at);
}

pub fn to_store_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(STORE_TIMESTAMP_FORMAT).to_string()
}

pub fn from_store_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), STORE_TIMESTAMP_PARSE)
        .ok()
        .map(|naive| naive.and_utc())
}
