//! Playlist analyzer module
//!
//! Orchestrates a full playlist run: token check, playlist listing, then
//! per-track fetch/decode/extract/normalize fanned out over a bounded
//! worker pool, and finally aggregation and mood classification. Results
//! come back in playlist order no matter how tasks interleave, and the
//! whole run can be cancelled through a `CancellationToken`.

pub mod aggregate;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{
    decode_preview, ExtractError, FeatureNormalizer, NormalizedTrackFeatures,
    TrackFeatureExtractor,
};
use crate::config::{AnalyzerSettings, PipelineSettings};
use crate::mood::{MoodCategory, MoodClassifier, MoodDistribution, TopTrack};
use crate::oauth::{TokenError, TokenManager};
use crate::preview::{FetchError, PreviewFetcher};
use crate::upstream::{MusicService, MusicServiceError, TrackRef};

use aggregate::{AggregationEmpty, FeatureAverages, TrackFailure, TrackFeatureRecord};

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("authorization expired for user {user_id}")]
    AuthExpired { user_id: String },
    #[error("playlist {0} not found")]
    PlaylistNotFound(String),
    #[error(transparent)]
    Empty(#[from] AggregationEmpty),
    #[error("music service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("rate limited by music service")]
    RateLimited { retry_after: Option<Duration> },
    #[error("analysis cancelled")]
    Cancelled,
}

impl From<TokenError> for AnalyzeError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::AuthExpired { user_id } => AnalyzeError::AuthExpired { user_id },
            TokenError::UpstreamUnavailable(reason) => AnalyzeError::UpstreamUnavailable(reason),
            TokenError::RateLimited { retry_after } => AnalyzeError::RateLimited { retry_after },
        }
    }
}

/// Map playlist read errors, attributing `Rejected` to the user's
/// authorization and `NotFound` to the playlist.
fn map_service_error(e: MusicServiceError, playlist_id: &str, user_id: &str) -> AnalyzeError {
    match e {
        MusicServiceError::Rejected(_) => AnalyzeError::AuthExpired {
            user_id: user_id.to_string(),
        },
        MusicServiceError::NotFound(_) => AnalyzeError::PlaylistNotFound(playlist_id.to_string()),
        MusicServiceError::RateLimited { retry_after } => AnalyzeError::RateLimited { retry_after },
        MusicServiceError::Unavailable(reason) => AnalyzeError::UpstreamUnavailable(reason),
    }
}

/// Final output of one playlist analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistMoodResult {
    pub analysis_id: String,
    pub playlist_id: String,
    pub playlist_name: String,
    pub primary_mood: String,
    pub mood_category: MoodCategory,
    pub mood_descriptors: Vec<String>,
    pub confidence: f32,
    pub averages: FeatureAverages,
    pub mood_distribution: MoodDistribution,
    pub top_tracks: Vec<TopTrack>,
    /// Tracks that contributed features, not the playlist length.
    pub track_count: usize,
    /// Per-track records in playlist order, failures included.
    pub raw_features: Vec<TrackFeatureRecord>,
    pub created_at: DateTime<Utc>,
}

/// Output of a single-preview analysis.
#[derive(Debug, Clone, Serialize)]
pub struct TrackMoodResult {
    pub features: NormalizedTrackFeatures,
    pub mood: String,
}

pub struct PlaylistAnalyzer {
    music: Arc<dyn MusicService>,
    previews: Arc<dyn PreviewFetcher>,
    tokens: Arc<TokenManager>,
    extractor: Arc<TrackFeatureExtractor>,
    normalizer: Arc<FeatureNormalizer>,
    classifier: MoodClassifier,
    pipeline: PipelineSettings,
}

impl PlaylistAnalyzer {
    pub fn new(
        music: Arc<dyn MusicService>,
        previews: Arc<dyn PreviewFetcher>,
        tokens: Arc<TokenManager>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            music,
            previews,
            tokens,
            extractor: Arc::new(TrackFeatureExtractor::new(settings.extraction)),
            normalizer: Arc::new(FeatureNormalizer::new(settings.weights)),
            classifier: MoodClassifier::new(settings.thresholds),
            pipeline: settings.pipeline,
        }
    }

    /// Analyze a playlist end to end for the given user.
    ///
    /// Per-track failures are recorded and never abort the run; only
    /// authorization, playlist lookup, cancellation, or a playlist with
    /// zero analyzable tracks fail the whole analysis.
    pub async fn analyze_playlist(
        &self,
        user_id: &str,
        playlist_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PlaylistMoodResult, AnalyzeError> {
        let analysis_id = Uuid::new_v4().to_string();
        info!(
            "Starting analysis {} of playlist {} for user {}",
            analysis_id, playlist_id, user_id
        );

        let access_token = self.tokens.ensure_valid(user_id).await?;

        let summary = self
            .music
            .playlist_summary(playlist_id, &access_token)
            .await
            .map_err(|e| map_service_error(e, playlist_id, user_id))?;
        let tracks = self
            .music
            .list_playlist_tracks(playlist_id, &access_token)
            .await
            .map_err(|e| map_service_error(e, playlist_id, user_id))?;
        info!("Playlist '{}' has {} tracks", summary.name, tracks.len());

        let outcomes = self.run_track_tasks(&tracks, cancel).await?;
        let results: Vec<_> = tracks.into_iter().zip(outcomes).collect();
        let aggregated = aggregate::aggregate(results)?;

        let verdict = self
            .classifier
            .classify(&aggregated.averages, &aggregated.analyzed);
        info!(
            "Analysis {} finished: {} ({} of {} tracks analyzed)",
            analysis_id,
            verdict.primary_mood,
            aggregated.track_count,
            aggregated.raw_features.len()
        );

        Ok(PlaylistMoodResult {
            analysis_id,
            playlist_id: summary.playlist_id,
            playlist_name: summary.name,
            primary_mood: verdict.primary_mood,
            mood_category: verdict.mood_category,
            mood_descriptors: verdict.mood_descriptors,
            confidence: verdict.confidence,
            averages: aggregated.averages,
            mood_distribution: verdict.mood_distribution,
            top_tracks: verdict.top_tracks,
            track_count: aggregated.track_count,
            raw_features: aggregated.raw_features,
            created_at: Utc::now(),
        })
    }

    /// Analyze one preview clip outside a playlist run.
    pub async fn analyze_preview(
        &self,
        track_id: &str,
        preview_url: &str,
    ) -> Result<TrackMoodResult, TrackFailure> {
        let track = TrackRef {
            track_id: track_id.to_string(),
            display_name: track_id.to_string(),
            preview_reference: Some(preview_url.to_string()),
        };
        let features = analyze_track(
            self.previews.clone(),
            self.extractor.clone(),
            self.normalizer.clone(),
            &track,
            Duration::from_secs(self.pipeline.fetch_timeout_secs),
        )
        .await?;
        let mood = self
            .classifier
            .track_mood_label(features.valence, features.energy);
        Ok(TrackMoodResult { features, mood })
    }

    /// Fan per-track work out over the worker pool and collect outcomes
    /// back into playlist order.
    async fn run_track_tasks(
        &self,
        tracks: &[TrackRef],
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<NormalizedTrackFeatures, TrackFailure>>, AnalyzeError> {
        let semaphore = Arc::new(Semaphore::new(self.pipeline.worker_count));
        let fetch_timeout = Duration::from_secs(self.pipeline.fetch_timeout_secs);
        let mut tasks: JoinSet<(usize, Result<NormalizedTrackFeatures, TrackFailure>)> =
            JoinSet::new();

        for (index, track) in tracks.iter().enumerate() {
            let semaphore = semaphore.clone();
            let previews = self.previews.clone();
            let extractor = self.extractor.clone();
            let normalizer = self.normalizer.clone();
            let track = track.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(TrackFailure::Aborted)),
                };
                let outcome =
                    analyze_track(previews, extractor, normalizer, &track, fetch_timeout).await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<Result<NormalizedTrackFeatures, TrackFailure>>> =
            (0..tracks.len()).map(|_| None).collect();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Analysis cancelled, aborting {} outstanding tasks", tasks.len());
                    tasks.abort_all();
                    return Err(AnalyzeError::Cancelled);
                }
                joined = tasks.join_next() => {
                    match joined {
                        None => break,
                        Some(Ok((index, outcome))) => slots[index] = Some(outcome),
                        Some(Err(e)) => {
                            // The slot stays empty and is reported as aborted.
                            warn!("Track analysis task failed: {}", e);
                        }
                    }
                }
            }
        }

        Ok(slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(TrackFailure::Aborted)))
            .collect())
    }
}

/// Fetch, decode, extract and normalize one track.
async fn analyze_track(
    previews: Arc<dyn PreviewFetcher>,
    extractor: Arc<TrackFeatureExtractor>,
    normalizer: Arc<FeatureNormalizer>,
    track: &TrackRef,
    fetch_timeout: Duration,
) -> Result<NormalizedTrackFeatures, TrackFailure> {
    let Some(preview_url) = &track.preview_reference else {
        debug!("Track {} has no preview", track.track_id);
        return Err(TrackFailure::NoPreview);
    };

    let bytes = match tokio::time::timeout(fetch_timeout, previews.fetch(preview_url)).await {
        Ok(fetched) => fetched?,
        Err(_) => {
            warn!("Preview fetch for track {} timed out", track.track_id);
            return Err(TrackFailure::Fetch(FetchError::Timeout));
        }
    };

    // Decode and extraction are CPU-bound, keep them off the async runtime.
    let track_id = track.track_id.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let decoded = decode_preview(bytes).map_err(ExtractError::from)?;
        let raw = extractor.extract(&decoded)?;
        Ok::<_, ExtractError>(normalizer.normalize(&track_id, &raw))
    })
    .await;

    match joined {
        Ok(Ok(features)) => Ok(features),
        Ok(Err(e)) => {
            warn!("Extraction failed for track {}: {}", track.track_id, e);
            Err(TrackFailure::Extraction(e))
        }
        Err(e) => {
            warn!("Extraction task for track {} did not finish: {}", track.track_id, e);
            Err(TrackFailure::Aborted)
        }
    }
}
