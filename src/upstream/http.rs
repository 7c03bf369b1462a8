//! Spotify Web API implementation of `MusicService`.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{MusicService, MusicServiceError, PlaylistSummary, TokenGrant, TrackRef};
use crate::config::MusicServiceConfig;

/// HTTP client for the Spotify Web API and its accounts service.
pub struct HttpMusicService {
    client: reqwest::Client,
    config: MusicServiceConfig,
}

impl HttpMusicService {
    pub fn new(config: MusicServiceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// POST to the token endpoint with the app's client credentials.
    async fn token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, MusicServiceError> {
        let url = format!("{}/api/token", self.config.accounts_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| MusicServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let grant: TokenGrantResponse = response
                .json()
                .await
                .map_err(|e| MusicServiceError::Unavailable(e.to_string()))?;
            return Ok(TokenGrant {
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                expires_in_secs: grant.expires_in,
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MusicServiceError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        let body = response.text().await.unwrap_or_default();
        if matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(MusicServiceError::Rejected(token_error_reason(&body, status)));
        }
        Err(MusicServiceError::Unavailable(format!(
            "token endpoint returned status {}",
            status
        )))
    }

    /// GET a JSON resource from the Web API with a bearer token.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, MusicServiceError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| MusicServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        match status {
            s if s.is_success() => response
                .json()
                .await
                .map_err(|e| MusicServiceError::Unavailable(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                MusicServiceError::Rejected(format!("access token rejected with status {status}")),
            ),
            StatusCode::NOT_FOUND => Err(MusicServiceError::NotFound(url.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(MusicServiceError::RateLimited {
                retry_after: retry_after(response.headers()),
            }),
            _ => Err(MusicServiceError::Unavailable(format!(
                "unexpected status {status} from {url}"
            ))),
        }
    }
}

#[async_trait]
impl MusicService for HttpMusicService {
    fn authorize_url(&self, state: &str) -> String {
        let scopes = self.config.scopes.join(" ");
        format!(
            "{}/authorize?response_type=code&client_id={}&scope={}&redirect_uri={}&state={}",
            self.config.accounts_base_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&scopes),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, MusicServiceError> {
        debug!("Exchanging authorization code");
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
        ])
        .await
    }

    async fn refresh_credential(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, MusicServiceError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn playlist_summary(
        &self,
        playlist_id: &str,
        access_token: &str,
    ) -> Result<PlaylistSummary, MusicServiceError> {
        let url = format!(
            "{}/playlists/{}?fields=id,name",
            self.config.api_base_url, playlist_id
        );
        let playlist: PlaylistResponse = self.get_json(&url, access_token).await?;
        Ok(PlaylistSummary {
            playlist_id: playlist.id,
            name: playlist.name,
        })
    }

    async fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        access_token: &str,
    ) -> Result<Vec<TrackRef>, MusicServiceError> {
        let mut tracks = Vec::new();
        let mut offset = 0usize;

        loop {
            let url = format!(
                "{}/playlists/{}/tracks?limit={}&offset={}&fields=next,items(track(id,name,preview_url,artists(name)))",
                self.config.api_base_url, playlist_id, self.config.page_size, offset
            );
            let page: PlaylistTracksPage = self.get_json(&url, access_token).await?;
            let item_count = page.items.len();

            for item in page.items {
                // Removed tracks come back as null items.
                let Some(track) = item.track else { continue };
                let Some(track_ref) = track.into_track_ref() else {
                    debug!("Skipping playlist item without track id");
                    continue;
                };
                tracks.push(track_ref);
            }

            if page.next.is_none() || item_count == 0 {
                break;
            }
            offset += item_count;
        }

        debug!(
            "Listed {} tracks for playlist {}",
            tracks.len(),
            playlist_id
        );
        Ok(tracks)
    }
}

/// Parse a Retry-After header given in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Pull the human-readable reason out of an OAuth error body, falling back
/// to the raw status when the body is not the documented shape.
fn token_error_reason(body: &str, status: StatusCode) -> String {
    if let Ok(err) = serde_json::from_str::<TokenErrorBody>(body) {
        if let Some(description) = err.error_description {
            return description;
        }
        if let Some(code) = err.error {
            return code;
        }
    }
    warn!("Token endpoint error body was not parseable (status {status})");
    format!("token endpoint returned status {status}")
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenGrantResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistTracksPage {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
    name: String,
    preview_url: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistObject>,
}

impl TrackObject {
    fn display_name(&self) -> String {
        let artists = self
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if artists.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", artists, self.name)
        }
    }

    /// Convert to the domain track, or `None` for items without an id
    /// (local files).
    fn into_track_ref(self) -> Option<TrackRef> {
        let display_name = self.display_name();
        Some(TrackRef {
            track_id: self.id?,
            display_name,
            preview_reference: self.preview_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}
