use crate::db::models::{
    from_store_timestamp, sort_by_sent_at, to_store_timestamp, ChatMessage, Conversation,
};
use chrono::{DateTime, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection, Error as DbError, Result as DbResult, Row};
use uuid::Uuid;

pub struct DbService;

fn conversion_error(
    column: usize,
    cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> DbError {
    DbError::FromSqlConversionFailure(column, Type::Text, cause.into())
}

fn timestamp_column(row: &Row, column: usize) -> DbResult<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    from_store_timestamp(&raw)
        .ok_or_else(|| conversion_error(column, format!("invalid timestamp '{}'", raw)))
}

impl DbService {
    // Timestamps are selected AS VARCHAR so we never depend on the driver's chrono support.
    // Rows that do not decode are errors, never coerced into a valid-looking message.
    fn row_to_message(row: &Row) -> DbResult<ChatMessage> {
        let role: String = row.get(3)?;
        let status: String = row.get(4)?;

        Ok(ChatMessage {
            id: Some(row.get::<_, String>(0)?),
            owner_id: row.get::<_, String>(1)?,
            body: row.get::<_, String>(2)?,
            role: role.parse().map_err(|e: String| conversion_error(3, e))?,
            status: status.parse().map_err(|e: String| conversion_error(4, e))?,
            sent_at: timestamp_column(row, 5)?,
        })
    }

    fn row_to_conversation(row: &Row) -> DbResult<Conversation> {
        let messages: String = row.get(5)?;

        Ok(Conversation {
            id: Some(row.get::<_, String>(0)?),
            owner_id: row.get::<_, String>(1)?,
            title: row.get::<_, Option<String>>(2)?,
            created_at: timestamp_column(row, 3)?,
            last_activity: timestamp_column(row, 4)?,
            messages: serde_json::from_str(&messages).map_err(|e| conversion_error(5, e))?,
        })
    }

    /// Writes `message` and returns the id assigned to it.
    pub fn insert_message(conn: &Connection, message: &ChatMessage) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO messages (id, owner_id, body, role, status, sent_at)
             VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                id,
                message.owner_id,
                message.body,
                message.role.as_str(),
                message.status.as_str(),
                to_store_timestamp(&message.sent_at),
            ],
        )?;

        Ok(id)
    }

    /// All messages of one owner, oldest first. The query itself is an
    /// equality filter only; ordering happens here.
    pub fn get_messages_for_owner(conn: &Connection, owner_id: &str) -> DbResult<Vec<ChatMessage>> {
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, body, role, status, CAST(sent_at AS VARCHAR)
             FROM messages
             WHERE owner_id = ?",
        )?;

        let rows = stmt.query_map(params![owner_id], Self::row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        sort_by_sent_at(&mut messages);
        Ok(messages)
    }

    pub fn delete_messages_for_owner(conn: &Connection, owner_id: &str) -> DbResult<usize> {
        conn.execute("DELETE FROM messages WHERE owner_id = ?", params![owner_id])
    }

    /// Stores a whole conversation as one record and returns its id.
    pub fn insert_conversation(conn: &Connection, conversation: &Conversation) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let messages = serde_json::to_string(&conversation.messages)
            .map_err(|e| DbError::ToSqlConversionFailure(Box::new(e)))?;

        conn.execute(
            "INSERT INTO conversations (id, owner_id, title, created_at, last_activity, messages)
             VALUES (?, ?, ?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?)",
            params![
                id,
                conversation.owner_id,
                conversation.title,
                to_store_timestamp(&conversation.created_at),
                to_store_timestamp(&conversation.last_activity),
                messages,
            ],
        )?;

        Ok(id)
    }

    /// Saved conversations of one owner, most recent activity first.
    pub fn get_conversations_for_owner(
        conn: &Connection,
        owner_id: &str,
    ) -> DbResult<Vec<Conversation>> {
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, title, CAST(created_at AS VARCHAR),
                    CAST(last_activity AS VARCHAR), messages
             FROM conversations
             WHERE owner_id = ?",
        )?;

        let rows = stmt.query_map(params![owner_id], Self::row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        conversations.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(conversations)
    }
}
