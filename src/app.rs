use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::auth::{AuthError, IdentityClient, LocalIdentityProvider, Principal};
use crate::chat::{ChatOrchestrator, ChatSettings};
use crate::config::AppConfig;
use crate::db::{DuckDbStore, StoreError};
use crate::llm::ProviderFactory;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to initialize database: {0}")]
    Database(#[from] StoreError),
    #[error("Unknown LLM provider '{0}' or missing provider section")]
    Provider(String),
}

/// Everything a front end needs, wired from one config.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityClient>,
    pub store: Arc<DuckDbStore>,
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn build(config: &AppConfig) -> Result<Self, StartupError> {
        let store = Arc::new(DuckDbStore::open(&config.database)?);

        let llm = ProviderFactory::create_default(config)
            .ok_or_else(|| StartupError::Provider(config.llm.provider.clone()))?;
        if !llm.is_configured() {
            warn!("Completion provider '{}' has no API key; sends will fail", llm.name());
        }

        let identity = Arc::new(IdentityClient::new(Arc::new(LocalIdentityProvider::new(
            config.identity.clone(),
        ))));

        let orchestrator = Arc::new(ChatOrchestrator::new(
            identity.clone(),
            store.clone(),
            llm,
            ChatSettings::from(&config.chat),
        ));

        Ok(Self {
            identity,
            store,
            orchestrator,
        })
    }

    /// Signs in and starts following the principal's history.
    pub async fn sign_in(&self) -> Result<Principal, AuthError> {
        let principal = self.identity.sign_in().await?;
        self.orchestrator.start(&principal.uid).await;
        Ok(principal)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.identity.sign_out().await?;
        self.orchestrator.end_session();
        Ok(())
    }
}
