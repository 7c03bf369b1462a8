//! Upstream music service module
//!
//! Defines the provider-neutral surface the rest of the crate talks to:
//! - `MusicService` trait for OAuth token grants and playlist reads
//! - `HttpMusicService`, the Spotify Web API implementation

mod http;

pub use http::HttpMusicService;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A playlist entry as listed by the upstream service.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRef {
    pub track_id: String,
    /// "Artist - Title" as shown in results and logs.
    pub display_name: String,
    /// URL of the 30 second preview clip, when the service exposes one.
    pub preview_reference: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaylistSummary {
    pub playlist_id: String,
    pub name: String,
}

/// Outcome of a token endpoint call, either a code exchange or a refresh.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present on code exchange, optional on refresh (token rotation).
    pub refresh_token: Option<String>,
    pub expires_in_secs: u64,
}

#[derive(Debug, Error)]
pub enum MusicServiceError {
    /// The service refused the request outright (bad grant, revoked token).
    #[error("rejected by music service: {0}")]
    Rejected(String),
    /// Throttled. `retry_after` mirrors the Retry-After header when present.
    #[error("rate limited by music service")]
    RateLimited { retry_after: Option<Duration> },
    #[error("not found: {0}")]
    NotFound(String),
    /// Transport failures and unexpected upstream responses.
    #[error("music service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MusicService: Send + Sync {
    /// Build the consent page URL carrying the given CSRF state.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the initial token grant.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, MusicServiceError>;

    /// Trade a refresh token for a new access token.
    async fn refresh_credential(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, MusicServiceError>;

    async fn playlist_summary(
        &self,
        playlist_id: &str,
        access_token: &str,
    ) -> Result<PlaylistSummary, MusicServiceError>;

    /// List every track of the playlist in playlist order, following
    /// pagination to the end.
    async fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        access_token: &str,
    ) -> Result<Vec<TrackRef>, MusicServiceError>;
}
