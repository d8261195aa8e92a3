use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::{IdentityClient, Principal};
use crate::chat::context::build_context;
use crate::config::ChatConfig;
use crate::db::models::{sort_by_sent_at, ChatMessage, MessageStatus, Role};
use crate::db::store::{HistoryStore, StoreError};
use crate::llm::{CompletionClient, LlmError};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("user is not authenticated")]
    NotAuthenticated,
    #[error("a message is already being sent")]
    SendInProgress,
    /// The apology has already been appended to the session list.
    #[error("{error}")]
    Completion {
        #[source]
        error: LlmError,
        apology: Box<ChatMessage>,
    },
}

impl ChatError {
    /// Text suitable for showing to the person chatting.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Completion { error, .. } => error.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Trim window: prior messages sent along as context.
    pub max_history_messages: usize,
    pub apology_message: String,
}

impl From<&ChatConfig> for ChatSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            max_history_messages: config.max_history_messages,
            apology_message: config.apology_message.clone(),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

/// Outcome of a best-effort write. A soft failure is logged, never raised.
#[derive(Debug)]
pub enum Persisted {
    Stored(String),
    SoftFailed(StoreError),
}

impl Persisted {
    pub fn is_stored(&self) -> bool {
        matches!(self, Persisted::Stored(_))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Persisted::Stored(id) => Some(id),
            Persisted::SoftFailed(_) => None,
        }
    }
}

/// What one send produced. Callers should read the reply from here: a
/// snapshot applied mid-send may not contain it yet.
#[derive(Debug)]
pub struct SendReport {
    pub message: ChatMessage,
    pub reply: ChatMessage,
    pub user: Persisted,
    pub assistant: Persisted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatStats {
    pub total: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

struct SessionState {
    messages: Mutex<Vec<ChatMessage>>,
    composing: AtomicBool,
    messages_tx: broadcast::Sender<Vec<ChatMessage>>,
    composing_tx: broadcast::Sender<bool>,
}

impl SessionState {
    fn new() -> Self {
        let (messages_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (composing_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            messages: Mutex::new(Vec::new()),
            composing: AtomicBool::new(false),
            messages_tx,
            composing_tx,
        }
    }

    fn snapshot(&self) -> Vec<ChatMessage> {
        lock(&self.messages).clone()
    }

    // Publishing happens under the lock so subscribers see mutations in order.
    fn replace(&self, mut messages: Vec<ChatMessage>) {
        sort_by_sent_at(&mut messages);
        let mut current = lock(&self.messages);
        *current = messages;
        let _ = self.messages_tx.send(current.clone());
    }

    fn append(&self, message: ChatMessage) {
        let mut current = lock(&self.messages);
        current.push(message);
        let _ = self.messages_tx.send(current.clone());
    }

    fn set_composing(&self, composing: bool) {
        self.composing.store(composing, Ordering::Release);
        let _ = self.composing_tx.send(composing);
    }
}

/// Raises the composing flag; lowers it when dropped, even if the send
/// future is abandoned halfway.
struct Composing<'a>(&'a SessionState);

impl<'a> Composing<'a> {
    fn begin(state: &'a SessionState) -> Self {
        state.set_composing(true);
        Self(state)
    }
}

impl Drop for Composing<'_> {
    fn drop(&mut self) {
        self.0.set_composing(false);
    }
}

struct SendSlot<'a>(&'a AtomicBool);

impl<'a> SendSlot<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SendSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the active session's message list and the composing flag.
///
/// Every mutation is republished in full to `subscribe_messages`
/// receivers. The list is replaced wholesale by store snapshots and
/// appended to by local sends.
pub struct ChatOrchestrator {
    identity: Arc<IdentityClient>,
    store: Arc<dyn HistoryStore>,
    llm: Arc<dyn CompletionClient>,
    settings: ChatSettings,
    state: Arc<SessionState>,
    listening: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
    sending: AtomicBool,
}

impl ChatOrchestrator {
    pub fn new(
        identity: Arc<IdentityClient>,
        store: Arc<dyn HistoryStore>,
        llm: Arc<dyn CompletionClient>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            identity,
            store,
            llm,
            settings,
            state: Arc::new(SessionState::new()),
            listening: Arc::new(AtomicBool::new(false)),
            listener: Mutex::new(None),
            sending: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &Arc<IdentityClient> {
        &self.identity
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Follows the owner's history. Errors end up as an empty list.
    pub async fn start(&self, owner_id: &str) {
        if self.listening.swap(true, Ordering::AcqRel) {
            warn!(owner = owner_id, "History listener already started");
            return;
        }

        let mut subscription = match self.store.subscribe(owner_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(owner = owner_id, error = %e, "Could not open history subscription");
                self.listening.store(false, Ordering::Release);
                self.state.replace(Vec::new());
                return;
            }
        };

        info!(owner = owner_id, "Listening for history snapshots");

        let state = self.state.clone();
        let listening = self.listening.clone();
        let owner = owner_id.to_string();
        let handle = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                match snapshot {
                    Ok(messages) => {
                        debug!(owner = %owner, count = messages.len(), "History snapshot received");
                        state.replace(messages);
                    }
                    Err(e) => {
                        error!(owner = %owner, error = %e, "History subscription failed");
                        state.replace(Vec::new());
                    }
                }
            }
            debug!(owner = %owner, "History subscription ended");
            listening.store(false, Ordering::Release);
        });

        if let Some(previous) = lock(&self.listener).replace(handle) {
            previous.abort();
        }
    }

    /// Stops future snapshot deliveries. In-flight sends still finish.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.listener).take() {
            handle.abort();
            info!("History listener stopped");
        }
        self.listening.store(false, Ordering::Release);
    }

    pub fn end_session(&self) {
        self.stop();
        self.clear();
    }

    pub async fn send(&self, text: &str) -> Result<Option<SendReport>, ChatError> {
        let body = text.trim();
        if body.is_empty() {
            debug!("Ignoring empty message");
            return Ok(None);
        }

        let principal = self.identity.current_principal().ok_or_else(|| {
            error!("Send attempted without an authenticated user");
            ChatError::NotAuthenticated
        })?;

        let _slot = SendSlot::acquire(&self.sending).ok_or_else(|| {
            warn!(uid = %principal.uid, "Rejecting send while another is in flight");
            ChatError::SendInProgress
        })?;

        let prior = self.state.snapshot();
        let message = ChatMessage::new(&principal.uid, body, Role::User, MessageStatus::Sending);
        self.state.append(message.clone());
        info!(uid = %principal.uid, "Sending message");

        let user = self.persist(&principal, &message).await;

        let composing = Composing::begin(&self.state);
        let context = build_context(&prior, self.settings.max_history_messages);

        let outcome = match self.llm.complete(body, &context).await {
            Ok(response) => {
                info!(model = %response.model, "Completion received");
                let reply = ChatMessage::new(
                    &principal.uid,
                    &response.content,
                    Role::Assistant,
                    MessageStatus::Sent,
                );
                self.state.append(reply.clone());
                let assistant = self.persist(&principal, &reply).await;
                Ok(Some(SendReport {
                    message,
                    reply,
                    user,
                    assistant,
                }))
            }
            Err(e) => {
                error!(error = %e, "Completion failed");
                let apology = ChatMessage::new(
                    &principal.uid,
                    &self.settings.apology_message,
                    Role::Assistant,
                    MessageStatus::Error,
                );
                self.state.append(apology.clone());
                self.persist(&principal, &apology).await;
                Err(ChatError::Completion {
                    error: e,
                    apology: Box::new(apology),
                })
            }
        };

        drop(composing);
        outcome
    }

    async fn persist(&self, principal: &Principal, message: &ChatMessage) -> Persisted {
        debug_assert_eq!(message.owner_id, principal.uid);

        match self.store.append(message).await {
            Ok(id) => {
                debug!(%id, role = %message.role, "Message persisted");
                Persisted::Stored(id)
            }
            Err(e) => {
                warn!(error = %e, role = %message.role, "Could not persist message, keeping local copy");
                Persisted::SoftFailed(e)
            }
        }
    }

    /// Empties the local list. The store is left alone.
    pub fn clear(&self) {
        debug!("Clearing local chat");
        self.state.replace(Vec::new());
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.state.snapshot()
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<Vec<ChatMessage>> {
        self.state.messages_tx.subscribe()
    }

    pub fn subscribe_composing(&self) -> broadcast::Receiver<bool> {
        self.state.composing_tx.subscribe()
    }

    pub fn is_composing(&self) -> bool {
        self.state.composing.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.identity.is_authenticated() && self.llm.is_configured()
    }

    pub fn stats(&self) -> ChatStats {
        let messages = lock(&self.state.messages);
        let user_messages = messages.iter().filter(|m| m.role == Role::User).count();
        ChatStats {
            total: messages.len(),
            user_messages,
            assistant_messages: messages.len() - user_messages,
            last_activity: messages.last().map(|m| m.sent_at),
        }
    }
}

impl Drop for ChatOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.listener).take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
