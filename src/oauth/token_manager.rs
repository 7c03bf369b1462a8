//! Access-token freshness and single-flight refresh.
//!
//! `ensure_valid` hands out a usable access token, refreshing through the
//! upstream service when the stored credential is stale. Refreshes are
//! single-flight per user: the first stale caller leads the upstream call
//! while concurrent callers queue on a per-user lock and reuse its outcome.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::credentials::{CredentialStore, OAuthCredential};
use crate::config::OauthSettings;
use crate::upstream::{MusicService, MusicServiceError};

#[derive(Debug, Error)]
pub enum TokenError {
    /// No usable credential; the user must run the authorization flow again.
    #[error("authorization expired for user {user_id}")]
    AuthExpired { user_id: String },
    /// The token endpoint could not be reached or answered abnormally.
    #[error("token refresh unavailable: {0}")]
    UpstreamUnavailable(String),
    /// The upstream is throttling token requests.
    #[error("token refresh rate limited")]
    RateLimited {
        retry_after: Option<std::time::Duration>,
    },
}

/// Per-user refresh flight state.
///
/// The slot mutex is the single-flight lock; it carries the most recent
/// attempt's failure so queued callers can adopt it. `attempts` counts
/// finished upstream calls and is read before queueing, which is how a
/// caller later tells "an attempt ended while I waited" from "nothing has
/// happened since I arrived".
#[derive(Default)]
struct RefreshFlight {
    slot: Mutex<Option<RefreshFailure>>,
    attempts: AtomicU64,
}

/// Refresh outcomes that leave no trace in the credential store but still
/// must be shared with callers queued behind the attempt.
#[derive(Debug, Clone)]
enum RefreshFailure {
    Unavailable(String),
    RateLimited {
        retry_after: Option<std::time::Duration>,
    },
}

impl RefreshFailure {
    fn from_outcome(outcome: &Result<String, TokenError>) -> Option<Self> {
        match outcome {
            Err(TokenError::UpstreamUnavailable(reason)) => {
                Some(RefreshFailure::Unavailable(reason.clone()))
            }
            Err(TokenError::RateLimited { retry_after }) => Some(RefreshFailure::RateLimited {
                retry_after: *retry_after,
            }),
            _ => None,
        }
    }

    fn to_error(&self) -> TokenError {
        match self {
            RefreshFailure::Unavailable(reason) => TokenError::UpstreamUnavailable(reason.clone()),
            RefreshFailure::RateLimited { retry_after } => TokenError::RateLimited {
                retry_after: *retry_after,
            },
        }
    }
}

pub struct TokenManager {
    credentials: Arc<dyn CredentialStore>,
    service: Arc<dyn MusicService>,
    refresh_skew_secs: u64,
    refresh_flights: Mutex<HashMap<String, Arc<RefreshFlight>>>,
}

impl TokenManager {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        service: Arc<dyn MusicService>,
        settings: OauthSettings,
    ) -> Self {
        Self {
            credentials,
            service,
            refresh_skew_secs: settings.refresh_skew_secs,
            refresh_flights: Mutex::new(HashMap::new()),
        }
    }

    /// Return a currently-valid access token for `user_id`, refreshing
    /// through the upstream service if the stored credential is within the
    /// expiry skew.
    pub async fn ensure_valid(&self, user_id: &str) -> Result<String, TokenError> {
        let credential = self
            .credentials
            .load(user_id)
            .await
            .ok_or_else(|| TokenError::AuthExpired {
                user_id: user_id.to_string(),
            })?;

        if credential.is_fresh(self.refresh_skew_secs) {
            return Ok(credential.access_token);
        }

        self.refresh(user_id).await
    }

    /// Single-flight refresh critical section, keyed per user.
    ///
    /// The store is re-checked under the lock: a caller that queued behind a
    /// successful leader finds a fresh credential and returns it without an
    /// upstream call. A leader whose refresh was rejected deletes the
    /// credential, so queued callers fail with `AuthExpired` the same way.
    /// Transport failures and rate limits leave the store untouched, so they
    /// are recorded on the flight instead: callers that queued while the
    /// attempt ran adopt its failure, and only a caller arriving after the
    /// attempt ended starts a new one.
    async fn refresh(&self, user_id: &str) -> Result<String, TokenError> {
        let flight = self.user_flight(user_id).await;
        let attempts_seen = flight.attempts.load(Ordering::Acquire);
        let result = {
            let mut slot = flight.slot.lock().await;
            match self.credentials.load(user_id).await {
                None => Err(TokenError::AuthExpired {
                    user_id: user_id.to_string(),
                }),
                Some(current) if current.is_fresh(self.refresh_skew_secs) => {
                    debug!("Refresh for user {} satisfied by queued result", user_id);
                    Ok(current.access_token)
                }
                Some(stale) => {
                    let attempt_ended_while_queued =
                        flight.attempts.load(Ordering::Acquire) > attempts_seen;
                    let adopted = if attempt_ended_while_queued {
                        slot.as_ref().map(RefreshFailure::to_error)
                    } else {
                        None
                    };
                    match adopted {
                        Some(err) => {
                            debug!("Adopting queued refresh failure for user {}", user_id);
                            Err(err)
                        }
                        None => {
                            let outcome = self.refresh_upstream(user_id, stale).await;
                            *slot = RefreshFailure::from_outcome(&outcome);
                            flight.attempts.fetch_add(1, Ordering::Release);
                            outcome
                        }
                    }
                }
            }
        };
        self.release_user_flight(user_id, flight).await;
        result
    }

    async fn refresh_upstream(
        &self,
        user_id: &str,
        stale: OAuthCredential,
    ) -> Result<String, TokenError> {
        debug!("Refreshing access token for user {}", user_id);
        match self.service.refresh_credential(&stale.refresh_token).await {
            Ok(grant) => {
                // A grant without a rotated refresh token keeps the old one.
                let refresh_token = grant.refresh_token.unwrap_or(stale.refresh_token);
                let credential = OAuthCredential {
                    user_id: user_id.to_string(),
                    access_token: grant.access_token.clone(),
                    refresh_token,
                    expires_at: Utc::now() + Duration::seconds(grant.expires_in_secs as i64),
                };
                self.credentials.save(credential).await;
                info!("Refreshed access token for user {}", user_id);
                Ok(grant.access_token)
            }
            Err(MusicServiceError::Rejected(reason)) => {
                // Revoked or invalid refresh token. Drop the credential so
                // queued callers fail fast without another upstream call.
                warn!("Token refresh rejected for user {}: {}", user_id, reason);
                self.credentials.delete(user_id).await;
                Err(TokenError::AuthExpired {
                    user_id: user_id.to_string(),
                })
            }
            Err(MusicServiceError::RateLimited { retry_after }) => {
                warn!("Token refresh rate limited for user {}", user_id);
                Err(TokenError::RateLimited { retry_after })
            }
            Err(e) => {
                warn!("Token refresh failed for user {}: {}", user_id, e);
                Err(TokenError::UpstreamUnavailable(e.to_string()))
            }
        }
    }

    /// Fetch or create the per-user refresh flight.
    async fn user_flight(&self, user_id: &str) -> Arc<RefreshFlight> {
        let mut flights = self.refresh_flights.lock().await;
        flights
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(RefreshFlight::default()))
            .clone()
    }

    /// Drop the map entry once no other caller holds the flight, so the map
    /// does not grow with user cardinality.
    async fn release_user_flight(&self, user_id: &str, flight: Arc<RefreshFlight>) {
        let mut flights = self.refresh_flights.lock().await;
        drop(flight);
        if let Some(entry) = flights.get(user_id) {
            if Arc::strong_count(entry) == 1 {
                flights.remove(user_id);
            }
        }
    }
}
