//! Playlist-level aggregation of per-track results.
//!
//! Successes contribute to per-metric arithmetic means; failures keep
//! their slot as an `unavailable` sentinel so the output list stays
//! positionally aligned with the playlist.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::analysis::{ExtractError, NormalizedTrackFeatures};
use crate::preview::FetchError;
use crate::upstream::TrackRef;

/// Zero tracks produced features, so no mood can be derived.
#[derive(Debug, Error)]
#[error("no tracks could be analyzed")]
pub struct AggregationEmpty;

/// Why one track produced no features. Local to the track, never fatal
/// to the playlist run.
#[derive(Debug, Error)]
pub enum TrackFailure {
    #[error("track has no preview audio")]
    NoPreview,
    #[error("preview fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error("analysis task aborted")]
    Aborted,
}

/// One slot of the positional per-track output list.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackFeatureRecord {
    Analyzed(NormalizedTrackFeatures),
    Unavailable { track_id: String, reason: String },
}

/// Arithmetic means over the successfully analyzed tracks.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureAverages {
    pub valence: f32,
    pub energy: f32,
    pub danceability: f32,
    pub tempo_bpm: f32,
    pub acousticness: f32,
    pub instrumentalness: f32,
}

/// A successfully analyzed track with its playlist display name.
#[derive(Debug, Clone)]
pub struct AnalyzedTrack {
    pub display_name: String,
    pub features: NormalizedTrackFeatures,
}

#[derive(Debug, Clone)]
pub struct AggregatedFeatures {
    pub averages: FeatureAverages,
    /// Number of tracks that contributed to the averages.
    pub track_count: usize,
    /// One record per input track, original playlist order.
    pub raw_features: Vec<TrackFeatureRecord>,
    /// The successful subset, playlist order.
    pub analyzed: Vec<AnalyzedTrack>,
}

/// Fold ordered per-track outcomes into playlist-level features.
pub fn aggregate(
    results: Vec<(TrackRef, Result<NormalizedTrackFeatures, TrackFailure>)>,
) -> Result<AggregatedFeatures, AggregationEmpty> {
    let mut raw_features = Vec::with_capacity(results.len());
    let mut analyzed = Vec::new();

    let mut valence = 0.0f32;
    let mut energy = 0.0f32;
    let mut danceability = 0.0f32;
    let mut tempo_bpm = 0.0f32;
    let mut acousticness = 0.0f32;
    let mut instrumentalness = 0.0f32;

    for (track, outcome) in results {
        match outcome {
            Ok(features) => {
                valence += features.valence;
                energy += features.energy;
                danceability += features.danceability;
                tempo_bpm += features.tempo_bpm;
                acousticness += features.acousticness;
                instrumentalness += features.instrumentalness;
                raw_features.push(TrackFeatureRecord::Analyzed(features.clone()));
                analyzed.push(AnalyzedTrack {
                    display_name: track.display_name,
                    features,
                });
            }
            Err(failure) => {
                warn!("Track {} unavailable: {}", track.track_id, failure);
                raw_features.push(TrackFeatureRecord::Unavailable {
                    track_id: track.track_id,
                    reason: failure.to_string(),
                });
            }
        }
    }

    let track_count = analyzed.len();
    if track_count == 0 {
        return Err(AggregationEmpty);
    }

    let n = track_count as f32;
    let averages = FeatureAverages {
        valence: valence / n,
        energy: energy / n,
        danceability: danceability / n,
        tempo_bpm: tempo_bpm / n,
        acousticness: acousticness / n,
        instrumentalness: instrumentalness / n,
    };

    Ok(AggregatedFeatures {
        averages,
        track_count,
        raw_features,
        analyzed,
    })
}
