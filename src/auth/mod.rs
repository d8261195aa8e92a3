pub mod local;

pub use local::LocalIdentityProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

const UNNAMED_USER: &str = "Unnamed user";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-in popup was closed by the user")]
    PopupClosedByUser,
    #[error("sign-in popup was blocked")]
    PopupBlocked,
    #[error("network request failed during sign-in")]
    NetworkRequestFailed,
    #[error("identity provider returned no user")]
    MissingUser,
    #[error("identity provider error ({code}): {message}")]
    Provider { code: String, message: String },
}

impl AuthError {
    /// Maps a provider error code onto the failures the UI tells apart.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        match code {
            "auth/popup-closed-by-user" => AuthError::PopupClosedByUser,
            "auth/popup-blocked" => AuthError::PopupBlocked,
            "auth/network-request-failed" => AuthError::NetworkRequestFailed,
            other => AuthError::Provider {
                code: other.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::PopupClosedByUser => {
                "You closed the sign-in window. Please try again."
            }
            AuthError::PopupBlocked => {
                "Your browser blocked the sign-in window. Allow popups and try again."
            }
            AuthError::NetworkRequestFailed => {
                "Connection error. Check your internet connection and try again."
            }
            AuthError::MissingUser => "Could not retrieve the user's information.",
            AuthError::Provider { .. } => "Sign-in failed. Please try again.",
        }
    }
}

/// What a federated provider hands back after a successful popup.
#[derive(Debug, Clone, Default)]
pub struct FederatedUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub signed_in_at: DateTime<Utc>,
}

impl From<FederatedUser> for Principal {
    fn from(user: FederatedUser) -> Self {
        Self {
            uid: user.uid,
            email: user.email.unwrap_or_default(),
            display_name: user
                .display_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| UNNAMED_USER.to_string()),
            photo_url: user.photo_url,
            signed_in_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Runs the popup flow. `Ok(None)` means the flow finished without a user.
    async fn sign_in_with_popup(&self) -> Result<Option<FederatedUser>, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Owns the current principal and publishes it to anyone watching.
pub struct IdentityClient {
    provider: Arc<dyn IdentityProvider>,
    principal: watch::Sender<Option<Principal>>,
}

impl IdentityClient {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (principal, _) = watch::channel(None);
        Self {
            provider,
            principal,
        }
    }

    pub async fn sign_in(&self) -> Result<Principal, AuthError> {
        let user = match self.provider.sign_in_with_popup().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                error!("Sign-in finished without a user");
                return Err(AuthError::MissingUser);
            }
            Err(e) => {
                error!(error = %e, "Sign-in failed");
                return Err(e);
            }
        };

        let principal = Principal::from(user);
        info!(uid = %principal.uid, email = %principal.email, "Signed in");
        self.principal.send_replace(Some(principal.clone()));
        Ok(principal)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        if let Err(e) = self.provider.sign_out().await {
            error!(error = %e, "Sign-out failed");
            return Err(e);
        }
        if let Some(previous) = self.principal.send_replace(None) {
            info!(uid = %previous.uid, "Signed out");
        }
        Ok(())
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.principal.borrow().clone()
    }

    pub fn uid(&self) -> Option<String> {
        self.principal.borrow().as_ref().map(|p| p.uid.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Principal>> {
        self.principal.subscribe()
    }

    pub fn watch_authenticated(&self) -> AuthenticatedSignal {
        AuthenticatedSignal {
            rx: self.principal.subscribe(),
        }
    }
}

/// Boolean view over the principal channel.
pub struct AuthenticatedSignal {
    rx: watch::Receiver<Option<Principal>>,
}

impl AuthenticatedSignal {
    pub fn get(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolves with the new value once authentication state flips.
    /// `None` when the identity client has been dropped.
    pub async fn changed(&mut self) -> Option<bool> {
        let current = self.get();
        loop {
            self.rx.changed().await.ok()?;
            let next = self.rx.borrow_and_update().is_some();
            if next != current {
                return Some(next);
            }
        }
    }
}
