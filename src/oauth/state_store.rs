//! Single-use CSRF state store for the authorization handshake.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::OauthSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// Covers absent, expired, and user-mismatched states alike; the caller
    /// restarts the authorization flow either way.
    #[error("authorization state is invalid or expired")]
    Invalid,
}

/// A pending handshake, keyed in the store by its state token.
#[derive(Debug, Clone)]
struct PendingState {
    user_id: String,
    expires_at: DateTime<Utc>,
}

/// Thread-safe store of in-flight authorization states.
///
/// States are single-use: `consume` removes the entry before validating it,
/// so no state can validate twice and concurrent consumes of the same state
/// succeed at most once.
pub struct OAuthStateStore {
    states: RwLock<HashMap<String, PendingState>>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new(settings: OauthSettings) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(settings.state_ttl_secs as i64),
        }
    }

    /// Issue a fresh state token bound to `user_id`.
    ///
    /// Leftovers from abandoned handshakes are swept on the way in.
    pub async fn issue(&self, user_id: &str) -> String {
        let token = generate_state_token();
        let now = Utc::now();
        let mut states = self.states.write().await;
        states.retain(|_, state| state.expires_at > now);
        states.insert(
            token.clone(),
            PendingState {
                user_id: user_id.to_string(),
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Atomically consume a state token on behalf of `user_id`.
    ///
    /// The entry is removed in the same step as the lookup, so a state
    /// consumed with the wrong user is burned rather than left around for
    /// another attempt.
    pub async fn consume(&self, state: &str, user_id: &str) -> Result<(), StateError> {
        let entry = {
            let mut states = self.states.write().await;
            states.remove(state)
        };

        let entry = entry.ok_or(StateError::Invalid)?;
        if entry.expires_at <= Utc::now() || entry.user_id != user_id {
            return Err(StateError::Invalid);
        }
        Ok(())
    }

    /// Remove expired, never-consumed entries.
    pub async fn sweep_expired(&self) {
        let now = Utc::now();
        let mut states = self.states.write().await;
        states.retain(|_, state| state.expires_at > now);
    }

    /// Number of pending states, for monitoring and tests.
    pub async fn pending_count(&self) -> usize {
        self.states.read().await.len()
    }
}

/// 32 random bytes, URL-safe base64 without padding.
fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
