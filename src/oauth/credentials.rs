//! Stored OAuth credentials, one per user.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One user's credential for the upstream music service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCredential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl OAuthCredential {
    /// Whether the access token stays valid for at least `skew_secs` more.
    pub fn is_fresh(&self, skew_secs: u64) -> bool {
        self.expires_at - Duration::seconds(skew_secs as i64) > Utc::now()
    }
}

/// Storage seam for per-user credentials.
///
/// At most one credential lives per user; `save` replaces any previous one
/// atomically. Persistent implementations belong to the embedding
/// application; [`MemoryCredentialStore`] covers tests and single-process
/// use.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Option<OAuthCredential>;
    async fn save(&self, credential: OAuthCredential);
    /// Returns true if a credential was present and removed.
    async fn delete(&self, user_id: &str) -> bool;
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<String, OAuthCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, user_id: &str) -> Option<OAuthCredential> {
        self.credentials.read().await.get(user_id).cloned()
    }

    async fn save(&self, credential: OAuthCredential) {
        let mut credentials = self.credentials.write().await;
        credentials.insert(credential.user_id.clone(), credential);
    }

    async fn delete(&self, user_id: &str) -> bool {
        self.credentials.write().await.remove(user_id).is_some()
    }
}
