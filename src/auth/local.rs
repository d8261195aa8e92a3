use async_trait::async_trait;
use tracing::debug;

use crate::auth::{AuthError, FederatedUser, IdentityProvider};
use crate::config::IdentityConfig;

/// Signs in the account named in the `identity` config section. Stands in
/// for a browser popup when the caller is a terminal or a local server.
pub struct LocalIdentityProvider {
    config: IdentityConfig,
}

impl LocalIdentityProvider {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in_with_popup(&self) -> Result<Option<FederatedUser>, AuthError> {
        let uid = match self.config.uid.as_deref().map(str::trim) {
            Some(uid) if !uid.is_empty() => uid.to_string(),
            _ => {
                return Err(AuthError::from_code(
                    "auth/operation-not-allowed",
                    "no identity.uid configured",
                ))
            }
        };

        debug!(%uid, "Local sign-in");
        Ok(Some(FederatedUser {
            uid,
            email: self.config.email.clone(),
            display_name: self.config.display_name.clone(),
            photo_url: self.config.photo_url.clone(),
        }))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}
