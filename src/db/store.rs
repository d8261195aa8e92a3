use async_trait::async_trait;
use std::sync::{MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::db::connection::{get_connection, DbPool};
use crate::db::models::{ChatMessage, Conversation};
use crate::db::service::DbService;

const SNAPSHOT_BUFFER: usize = 16;
const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),
}

pub type Snapshot = Result<Vec<ChatMessage>, StoreError>;

/// A live query. Yields the complete matching set on every change;
/// dropping it stops delivery.
pub struct Subscription {
    rx: mpsc::Receiver<Snapshot>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<Snapshot>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Waits for the next snapshot. `None` once the store side has closed.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persists one message and returns the id the store assigned.
    async fn append(&self, message: &ChatMessage) -> Result<String, StoreError>;

    /// Opens a live query over every message owned by `owner_id`.
    async fn subscribe(&self, owner_id: &str) -> Result<Subscription, StoreError>;
}

pub fn validate(message: &ChatMessage) -> Result<(), StoreError> {
    if message.owner_id.is_empty() {
        return Err(StoreError::InvalidMessage("owner_id is required"));
    }
    if message.body.is_empty() {
        return Err(StoreError::InvalidMessage("body is required"));
    }
    Ok(())
}

pub struct DuckDbStore {
    pool: DbPool,
    changes: broadcast::Sender<String>,
}

impl DuckDbStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    pub fn open(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool =
            get_connection(config).map_err(|e| StoreError::PersistenceFailed(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn list(&self, owner_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        query_owner(&self.pool, owner_id).map_err(|e| StoreError::PersistenceFailed(e.to_string()))
    }

    pub fn purge(&self, owner_id: &str) -> Result<usize, StoreError> {
        let deleted = {
            let conn = lock(&self.pool);
            DbService::delete_messages_for_owner(&conn, owner_id)
                .map_err(|e| StoreError::PersistenceFailed(e.to_string()))?
        };
        info!(owner = owner_id, deleted, "Purged message history");
        let _ = self.changes.send(owner_id.to_string());
        Ok(deleted)
    }

    /// Keeps a copy of a whole conversation. Live queries are not notified.
    pub fn save_conversation(&self, conversation: &Conversation) -> Result<String, StoreError> {
        if conversation.owner_id.is_empty() {
            return Err(StoreError::InvalidMessage("owner_id is required"));
        }

        let id = {
            let conn = lock(&self.pool);
            DbService::insert_conversation(&conn, conversation)
                .map_err(|e| StoreError::PersistenceFailed(e.to_string()))?
        };
        info!(
            owner = %conversation.owner_id,
            %id,
            messages = conversation.messages.len(),
            "Conversation saved"
        );
        Ok(id)
    }

    pub fn conversations(&self, owner_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let conn = lock(&self.pool);
        DbService::get_conversations_for_owner(&conn, owner_id)
            .map_err(|e| StoreError::PersistenceFailed(e.to_string()))
    }
}

#[async_trait]
impl HistoryStore for DuckDbStore {
    async fn append(&self, message: &ChatMessage) -> Result<String, StoreError> {
        validate(message)?;

        let id = {
            let conn = lock(&self.pool);
            DbService::insert_message(&conn, message)
                .map_err(|e| StoreError::PersistenceFailed(e.to_string()))?
        };
        debug!(owner = %message.owner_id, %id, role = %message.role, "Message stored");

        // No live queries is not an error
        let _ = self.changes.send(message.owner_id.clone());
        Ok(id)
    }

    async fn subscribe(&self, owner_id: &str) -> Result<Subscription, StoreError> {
        // Subscribe to the change feed before the first read so no write slips between them.
        let mut changes = self.changes.subscribe();
        let initial = query_owner(&self.pool, owner_id)
            .map_err(|e| StoreError::SubscriptionFailed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let pool = self.pool.clone();
        let owner = owner_id.to_string();

        info!(owner = %owner, "Opening live history query");

        let task = tokio::spawn(async move {
            if tx.send(Ok(initial)).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    Ok(changed) if changed != owner => continue,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(owner = %owner, skipped, "Live query lagged, re-reading");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                let snapshot = query_owner(&pool, &owner)
                    .map_err(|e| StoreError::SubscriptionFailed(e.to_string()));
                if tx.send(snapshot).await.is_err() {
                    break;
                }
            }
            debug!(owner = %owner, "Live history query closed");
        });

        Ok(Subscription::new(rx, Some(task)))
    }
}

fn lock(pool: &DbPool) -> MutexGuard<'_, duckdb::Connection> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

fn query_owner(pool: &DbPool, owner_id: &str) -> duckdb::Result<Vec<ChatMessage>> {
    let conn = lock(pool);
    DbService::get_messages_for_owner(&conn, owner_id)
}
