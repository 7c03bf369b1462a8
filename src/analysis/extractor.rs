//! Raw feature extraction from decoded preview audio.
//!
//! Walks the first part of the clip in overlapping frames and measures:
//! - RMS energy envelope
//! - spectral centroid series
//! - averaged 12-bin chroma profile
//! - tempo estimate from envelope flux autocorrelation
//! - integrated loudness

use thiserror::Error;
use tracing::debug;

use super::decode::{DecodeError, DecodedAudio};
use super::spectral;
use crate::config::ExtractionSettings;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The clip is too short to say anything meaningful about.
    #[error("insufficient audio: {duration_secs:.1}s is below the {min_secs:.0}s minimum")]
    InsufficientAudio { duration_secs: f32, min_secs: f32 },
    /// Peak amplitude never rose above the silence floor.
    #[error("audio is effectively silent")]
    SilentAudio,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Frame-level measurements of one track, before normalization.
#[derive(Debug, Clone)]
pub struct RawTrackFeatures {
    pub tempo_bpm: f32,
    /// Per-frame RMS over the analysis window.
    pub rms_energy_envelope: Vec<f32>,
    /// Per-frame spectral centroid, in Hz.
    pub spectral_centroid_series: Vec<f32>,
    /// Pitch-class distribution, index 0 is C, sums to 1 (or all zero).
    pub chroma_vector: [f32; 12],
    pub loudness_db: f32,
    /// Full clip duration, not just the analyzed window.
    pub duration_secs: f32,
}

pub struct TrackFeatureExtractor {
    settings: ExtractionSettings,
    window: Vec<f32>,
}

impl TrackFeatureExtractor {
    pub fn new(settings: ExtractionSettings) -> Self {
        let window = spectral::hann_window(settings.frame_len);
        Self { settings, window }
    }

    /// Extract raw features from decoded audio.
    ///
    /// Only the first `analysis_window_secs` of the clip are measured; the
    /// reported duration still covers the whole clip.
    pub fn extract(&self, audio: &DecodedAudio) -> Result<RawTrackFeatures, ExtractError> {
        let s = &self.settings;
        let duration_secs = audio.duration_secs();
        if duration_secs < s.min_duration_secs {
            return Err(ExtractError::InsufficientAudio {
                duration_secs,
                min_secs: s.min_duration_secs,
            });
        }

        let window_samples =
            ((s.analysis_window_secs * audio.sample_rate as f32) as usize).min(audio.samples.len());
        let samples = &audio.samples[..window_samples];
        if samples.len() < s.frame_len {
            return Err(ExtractError::InsufficientAudio {
                duration_secs,
                min_secs: s.min_duration_secs,
            });
        }

        let peak = samples.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
        if peak < s.silence_floor {
            return Err(ExtractError::SilentAudio);
        }

        let mut envelope = Vec::new();
        let mut centroids = Vec::new();
        let mut chroma = [0.0f32; 12];

        let mut start = 0;
        while start + s.frame_len <= samples.len() {
            let frame = &samples[start..start + s.frame_len];
            envelope.push(spectral::rms(frame));

            let spectrum = spectral::magnitude_spectrum(frame, &self.window);
            centroids.push(spectral::spectral_centroid(
                &spectrum,
                audio.sample_rate,
                s.frame_len,
            ));
            spectral::accumulate_chroma(
                &spectrum,
                audio.sample_rate,
                s.frame_len,
                s.chroma_low_hz,
                s.chroma_high_hz,
                &mut chroma,
            );

            start += s.hop_len;
        }

        // Accumulated power profile becomes a distribution over the twelve
        // pitch classes.
        let chroma_total: f32 = chroma.iter().sum();
        if chroma_total > 0.0 {
            for v in &mut chroma {
                *v /= chroma_total;
            }
        }

        let tempo_bpm = self.estimate_tempo(&envelope, audio.sample_rate);
        let loudness_db = integrated_loudness_db(&envelope);

        debug!(
            "Extracted {} frames, tempo {:.1} bpm, loudness {:.1} dB",
            envelope.len(),
            tempo_bpm,
            loudness_db
        );

        Ok(RawTrackFeatures {
            tempo_bpm,
            rms_energy_envelope: envelope,
            spectral_centroid_series: centroids,
            chroma_vector: chroma,
            loudness_db,
            duration_secs,
        })
    }

    /// Tempo from the periodicity of envelope energy rises.
    ///
    /// Half-wave rectified flux is autocorrelated over the lag range that
    /// maps into the configured BPM band. Each lag's score is normalized by
    /// overlap length and weighted by a log2-Gaussian prior centered on
    /// `tempo_prior_bpm`, one octave wide, then the winning lag is refined
    /// by parabolic interpolation. An envelope with no modulation to speak
    /// of falls back to the prior.
    fn estimate_tempo(&self, envelope: &[f32], sample_rate: u32) -> f32 {
        let s = &self.settings;
        let frames_per_sec = sample_rate as f32 / s.hop_len as f32;

        if envelope.len() < 4 {
            return s.tempo_prior_bpm;
        }

        let mut flux: Vec<f32> = envelope
            .windows(2)
            .map(|w| (w[1] - w[0]).max(0.0))
            .collect();

        // Windowed RMS of a sustained tone ripples a fraction of a percent,
        // and that ripple autocorrelates. Only an envelope with meaningful
        // modulation relative to its own level gets an estimate.
        let level = envelope.iter().sum::<f32>() / envelope.len() as f32;
        let flux_peak = flux.iter().fold(0.0f32, |m, &v| m.max(v));
        if flux_peak < s.tempo_flux_floor * level {
            return s.tempo_prior_bpm;
        }

        let mean = flux.iter().sum::<f32>() / flux.len() as f32;
        for v in &mut flux {
            *v -= mean;
        }

        let min_lag = ((60.0 * frames_per_sec / s.max_tempo_bpm).floor() as usize).max(1);
        let max_lag = ((60.0 * frames_per_sec / s.min_tempo_bpm).ceil() as usize)
            .min(flux.len().saturating_sub(1));
        if min_lag >= max_lag {
            return s.tempo_prior_bpm;
        }

        let mut scores = vec![0.0f32; max_lag + 1];
        let mut best_lag = 0;
        let mut best_score = 0.0f32;
        for lag in min_lag..=max_lag {
            let overlap = flux.len() - lag;
            let mut acc = 0.0f32;
            for i in 0..overlap {
                acc += flux[i] * flux[i + lag];
            }
            let bpm = 60.0 * frames_per_sec / lag as f32;
            let octave_offset = (bpm / s.tempo_prior_bpm).log2();
            let weight = (-0.5 * octave_offset * octave_offset).exp();
            let score = weight * acc / overlap as f32;
            scores[lag] = score;
            if score > best_score {
                best_score = score;
                best_lag = lag;
            }
        }

        if best_lag == 0 || best_score <= 0.0 {
            return s.tempo_prior_bpm;
        }

        let mut lag = best_lag as f32;
        if best_lag > min_lag && best_lag < max_lag {
            let prev = scores[best_lag - 1];
            let here = scores[best_lag];
            let next = scores[best_lag + 1];
            let denom = prev - 2.0 * here + next;
            if denom.abs() > f32::EPSILON {
                lag += (0.5 * (prev - next) / denom).clamp(-0.5, 0.5);
            }
        }

        (60.0 * frames_per_sec / lag).clamp(s.min_tempo_bpm, s.max_tempo_bpm)
    }
}

/// Mean envelope RMS in dBFS, floored at -80.
fn integrated_loudness_db(envelope: &[f32]) -> f32 {
    if envelope.is_empty() {
        return -80.0;
    }
    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    if mean <= 0.0 {
        return -80.0;
    }
    (20.0 * mean.log10()).max(-80.0)
}
