//! User-facing authorization flow against the upstream music service.
//!
//! - `begin_authorization` issues a CSRF state and builds the consent URL
//! - `complete_authorization` validates the callback and stores a credential
//! - `disconnect` forgets the stored credential

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::credentials::{CredentialStore, OAuthCredential};
use super::state_store::{OAuthStateStore, StateError};
use crate::upstream::{MusicService, MusicServiceError};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("authorization code exchange failed: {0}")]
    Service(#[from] MusicServiceError),
}

pub struct AuthorizationFlow {
    states: Arc<OAuthStateStore>,
    credentials: Arc<dyn CredentialStore>,
    service: Arc<dyn MusicService>,
}

impl AuthorizationFlow {
    pub fn new(
        states: Arc<OAuthStateStore>,
        credentials: Arc<dyn CredentialStore>,
        service: Arc<dyn MusicService>,
    ) -> Self {
        Self {
            states,
            credentials,
            service,
        }
    }

    /// Issue a pending state for `user_id` and return the consent page URL
    /// to redirect the user to.
    pub async fn begin_authorization(&self, user_id: &str) -> String {
        let state = self.states.issue(user_id).await;
        self.service.authorize_url(&state)
    }

    /// Handle the OAuth callback: burn the state, exchange the code and
    /// persist the resulting credential.
    pub async fn complete_authorization(
        &self,
        user_id: &str,
        state: &str,
        code: &str,
    ) -> Result<(), FlowError> {
        self.states.consume(state, user_id).await?;

        let grant = self.service.exchange_code(code).await?;
        let refresh_token = grant.refresh_token.ok_or_else(|| {
            warn!("Authorization grant for user {} had no refresh token", user_id);
            MusicServiceError::Unavailable("grant missing refresh token".to_string())
        })?;

        let credential = OAuthCredential {
            user_id: user_id.to_string(),
            access_token: grant.access_token,
            refresh_token,
            expires_at: chrono::Utc::now()
                + chrono::Duration::seconds(grant.expires_in_secs as i64),
        };
        self.credentials.save(credential).await;
        info!("Stored credential for user {}", user_id);
        Ok(())
    }

    /// Forget the stored credential, returning whether one existed.
    pub async fn disconnect(&self, user_id: &str) -> bool {
        let removed = self.credentials.delete(user_id).await;
        if removed {
            info!("Disconnected user {}", user_id);
        }
        removed
    }

    pub async fn is_connected(&self, user_id: &str) -> bool {
        self.credentials.load(user_id).await.is_some()
    }
}
