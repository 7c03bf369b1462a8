//! Moodscope Library
//!
//! Playlist mood analysis against a streaming music service: OAuth
//! connection handling, preview audio fetching and decoding, per-track
//! feature extraction, and playlist-level mood classification.

pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod mood;
pub mod oauth;
pub mod preview;
pub mod upstream;

// Re-export commonly used types for convenience
pub use analyzer::{AnalyzeError, PlaylistAnalyzer, PlaylistMoodResult, TrackMoodResult};
pub use config::{AnalyzerSettings, OauthSettings};
pub use oauth::{
    AuthorizationFlow, CredentialStore, MemoryCredentialStore, OAuthCredential, OAuthStateStore,
    TokenManager,
};
pub use preview::{HttpPreviewFetcher, PreviewFetcher};
pub use upstream::{HttpMusicService, MusicService, TrackRef};
