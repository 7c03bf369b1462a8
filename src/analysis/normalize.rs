//! Raw-to-normalized feature mapping.
//!
//! Every output lands in [0,1] except tempo, which passes through in BPM.
//! Energy and brightness use per-track adaptive min-max normalization over
//! the track's own envelope and centroid series, trading cross-track
//! absolute comparability for robustness to each clip's dynamic range.

use serde::Serialize;

use super::extractor::RawTrackFeatures;
use crate::config::NormalizerWeights;

/// Per-track metrics on a common [0,1] scale (tempo stays in BPM).
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedTrackFeatures {
    pub track_id: String,
    pub valence: f32,
    pub energy: f32,
    pub danceability: f32,
    pub tempo_bpm: f32,
    pub acousticness: f32,
    pub instrumentalness: f32,
}

pub struct FeatureNormalizer {
    weights: NormalizerWeights,
}

impl FeatureNormalizer {
    pub fn new(weights: NormalizerWeights) -> Self {
        Self { weights }
    }

    /// Apply the documented normalization formulas to one track.
    ///
    /// - energy: mean of the min-max normalized RMS envelope
    /// - valence: weighted blend of normalized brightness and tempo
    /// - danceability: closeness to the optimal dance tempo blended with energy
    /// - acousticness/instrumentalness: tonal concentration of the chroma
    ///   profile blended with envelope steadiness
    pub fn normalize(&self, track_id: &str, raw: &RawTrackFeatures) -> NormalizedTrackFeatures {
        let w = &self.weights;

        let envelope_norm = min_max_normalize(&raw.rms_energy_envelope);
        let energy = mean(&envelope_norm);

        let brightness = mean(&min_max_normalize(&raw.spectral_centroid_series));
        let tempo_norm = (raw.tempo_bpm / w.tempo_ceiling_bpm).clamp(0.0, 1.0);
        let valence =
            (w.valence_brightness_weight * brightness + w.valence_tempo_weight * tempo_norm)
                .clamp(0.0, 1.0);

        let tempo_fit = (1.0
            - (raw.tempo_bpm - w.dance_optimal_bpm).abs() / w.dance_optimal_bpm)
            .clamp(0.0, 1.0);
        let danceability =
            (w.dance_tempo_weight * tempo_fit + w.dance_energy_weight * energy).clamp(0.0, 1.0);

        // Tonality: 1 - spectral flatness of the chroma profile, high when
        // energy concentrates on few pitch classes. Steadiness: 1 - spread
        // of the normalized envelope, high for even dynamics.
        let tonality = 1.0 - chroma_flatness(&raw.chroma_vector);
        let steadiness = 1.0 - envelope_spread(&envelope_norm);
        let acousticness = (w.acoustic_tonality_weight * tonality
            + w.acoustic_steadiness_weight * steadiness)
            .clamp(0.0, 1.0);
        let instrumentalness = (w.instrumental_tonality_weight * tonality
            + w.instrumental_steadiness_weight * steadiness)
            .clamp(0.0, 1.0);

        NormalizedTrackFeatures {
            track_id: track_id.to_string(),
            valence,
            energy,
            danceability,
            tempo_bpm: raw.tempo_bpm,
            acousticness,
            instrumentalness,
        }
    }
}

/// Min-max normalize a series to [0,1] against its own extremes.
///
/// A constant series maps to all zeros, so a clip with no dynamics reads
/// as zero energy rather than an arbitrary level.
pub fn min_max_normalize(series: &[f32]) -> Vec<f32> {
    if series.is_empty() {
        return Vec::new();
    }
    let min = series.iter().copied().fold(f32::INFINITY, f32::min);
    let max = series.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        return vec![0.0; series.len()];
    }
    series
        .iter()
        .map(|v| ((v - min) / range).clamp(0.0, 1.0))
        .collect()
}

fn mean(series: &[f32]) -> f32 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f32>() / series.len() as f32
}

/// Spectral flatness of the chroma profile, geometric over arithmetic mean.
///
/// 1 for a uniform profile (noise-like), near 0 when a single pitch class
/// holds the energy. An empty profile counts as flat.
fn chroma_flatness(chroma: &[f32; 12]) -> f32 {
    let arithmetic = chroma.iter().sum::<f32>() / 12.0;
    if arithmetic <= 0.0 {
        return 1.0;
    }
    let log_sum: f32 = chroma.iter().map(|v| (v + 1e-10).ln()).sum();
    let geometric = (log_sum / 12.0).exp();
    (geometric / arithmetic).clamp(0.0, 1.0)
}

/// Spread of a normalized envelope: twice the standard deviation, clamped
/// to [0,1]. Zero for perfectly steady dynamics.
fn envelope_spread(envelope_norm: &[f32]) -> f32 {
    if envelope_norm.is_empty() {
        return 0.0;
    }
    let mean = mean(envelope_norm);
    let variance = envelope_norm
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f32>()
        / envelope_norm.len() as f32;
    (2.0 * variance.sqrt()).clamp(0.0, 1.0)
}
