//! Common test infrastructure
//!
//! Scripted fakes for the upstream music service and preview fetcher plus
//! WAV fixture builders. Tests should only import from this module, not
//! from internal submodules.

// Each test binary compiles this module and uses a different subset of it.
#![allow(dead_code)]

mod fakes;
mod fixtures;

// Public API - this is what tests import
pub use fakes::{FakeMusicService, FakePreviewFetcher, PreviewBehavior, RefreshBehavior};
pub use fixtures::{
    click_wav, credential, init_tracing, silent_wav, sine_wav, state_param, track, wav_bytes,
};

use moodscope::{AnalyzerSettings, OauthSettings, PlaylistAnalyzer, TokenManager};
use moodscope::{MemoryCredentialStore, MusicService, PreviewFetcher};
use std::sync::Arc;

/// Wire an analyzer from fakes with an in-memory credential store.
///
/// Returns the store so tests can seed or inspect credentials.
pub fn build_analyzer(
    music: Arc<dyn MusicService>,
    previews: Arc<dyn PreviewFetcher>,
    settings: AnalyzerSettings,
) -> (PlaylistAnalyzer, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::new());
    let tokens = Arc::new(TokenManager::new(
        store.clone(),
        music.clone(),
        OauthSettings::default(),
    ));
    let analyzer = PlaylistAnalyzer::new(music, previews, tokens, settings);
    (analyzer, store)
}
