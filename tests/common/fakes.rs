//! Scripted fakes for the upstream collaborators.

use async_trait::async_trait;
use moodscope::preview::{FetchError, PreviewFetcher};
use moodscope::upstream::{
    MusicService, MusicServiceError, PlaylistSummary, TokenGrant, TrackRef,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Copy)]
pub enum RefreshBehavior {
    Succeed,
    Reject,
    Unavailable,
}

/// In-memory `MusicService` scripted with one playlist.
pub struct FakeMusicService {
    playlist_id: String,
    playlist_name: String,
    tracks: Vec<TrackRef>,
    refresh_behavior: RefreshBehavior,
    refresh_delay: Option<Duration>,
    list_error: Mutex<Option<MusicServiceError>>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeMusicService {
    pub fn new(playlist_id: &str, playlist_name: &str, tracks: Vec<TrackRef>) -> Self {
        Self {
            playlist_id: playlist_id.to_string(),
            playlist_name: playlist_name.to_string(),
            tracks,
            refresh_behavior: RefreshBehavior::Succeed,
            refresh_delay: None,
            list_error: Mutex::new(None),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_refresh_behavior(mut self, behavior: RefreshBehavior) -> Self {
        self.refresh_behavior = behavior;
        self
    }

    /// Slow the refresh endpoint down so concurrent callers overlap.
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    /// Script one failure for the next track listing call.
    pub fn with_list_error(self, error: MusicServiceError) -> Self {
        *self.list_error.lock().unwrap() = Some(error);
        self
    }
}

#[async_trait]
impl MusicService for FakeMusicService {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://accounts.example/authorize?client_id=test&state={state}")
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, MusicServiceError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if code == "bad-code" {
            return Err(MusicServiceError::Rejected("invalid code".into()));
        }
        Ok(TokenGrant {
            access_token: "access-initial".to_string(),
            refresh_token: Some("refresh-initial".to_string()),
            expires_in_secs: 3600,
        })
    }

    async fn refresh_credential(
        &self,
        _refresh_token: &str,
    ) -> Result<TokenGrant, MusicServiceError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        match self.refresh_behavior {
            RefreshBehavior::Succeed => Ok(TokenGrant {
                access_token: format!("access-refreshed-{call}"),
                refresh_token: None,
                expires_in_secs: 3600,
            }),
            RefreshBehavior::Reject => {
                Err(MusicServiceError::Rejected("refresh token revoked".into()))
            }
            RefreshBehavior::Unavailable => {
                Err(MusicServiceError::Unavailable("connection refused".into()))
            }
        }
    }

    async fn playlist_summary(
        &self,
        playlist_id: &str,
        _access_token: &str,
    ) -> Result<PlaylistSummary, MusicServiceError> {
        if playlist_id != self.playlist_id {
            return Err(MusicServiceError::NotFound(playlist_id.to_string()));
        }
        Ok(PlaylistSummary {
            playlist_id: self.playlist_id.clone(),
            name: self.playlist_name.clone(),
        })
    }

    async fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        _access_token: &str,
    ) -> Result<Vec<TrackRef>, MusicServiceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.list_error.lock().unwrap().take() {
            return Err(error);
        }
        if playlist_id != self.playlist_id {
            return Err(MusicServiceError::NotFound(playlist_id.to_string()));
        }
        Ok(self.tracks.clone())
    }
}

/// What the fake fetcher does for one preview URL.
pub enum PreviewBehavior {
    Bytes(Vec<u8>),
    /// Respond with the bytes after a pause, for ordering and cancellation
    /// tests.
    DelayedBytes(Vec<u8>, Duration),
    NotFound,
    Timeout,
}

/// `PreviewFetcher` scripted per URL. Unknown URLs report `NotFound`.
pub struct FakePreviewFetcher {
    responses: HashMap<String, PreviewBehavior>,
    pub fetch_calls: AtomicUsize,
}

impl FakePreviewFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_response(mut self, url: &str, behavior: PreviewBehavior) -> Self {
        self.responses.insert(url.to_string(), behavior);
        self
    }
}

impl Default for FakePreviewFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreviewFetcher for FakePreviewFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(url) {
            Some(PreviewBehavior::Bytes(bytes)) => Ok(bytes.clone()),
            Some(PreviewBehavior::DelayedBytes(bytes, delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(bytes.clone())
            }
            Some(PreviewBehavior::NotFound) | None => Err(FetchError::NotFound),
            Some(PreviewBehavior::Timeout) => Err(FetchError::Timeout),
        }
    }
}
