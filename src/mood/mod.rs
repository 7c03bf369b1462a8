//! Mood classification module
//!
//! Turns aggregated playlist features into the final verdict using a
//! two-axis valence/energy circumplex:
//! - quadrant at the axis midpoints picks the primary mood
//! - secondary metrics add descriptor tags in a fixed rule order
//! - distance from the axis center scores confidence
//! - per-track positions yield the mood distribution and standout tracks

use serde::Serialize;
use std::fmt;

use crate::analyzer::aggregate::{AnalyzedTrack, FeatureAverages};
use crate::config::ClassifierThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodCategory {
    Upbeat,
    Chill,
    Intense,
    Melancholic,
}

impl fmt::Display for MoodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MoodCategory::Upbeat => "upbeat",
            MoodCategory::Chill => "chill",
            MoodCategory::Intense => "intense",
            MoodCategory::Melancholic => "melancholic",
        };
        write!(f, "{name}")
    }
}

/// Share of analyzed tracks (percent, one decimal) falling in each band.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MoodDistribution {
    pub happy: f32,
    pub sad: f32,
    pub energetic: f32,
    pub calm: f32,
    pub danceable: f32,
}

/// A track standing far from the emotional center of the playlist.
#[derive(Debug, Clone, Serialize)]
pub struct TopTrack {
    pub track_id: String,
    pub display_name: String,
    pub valence: f32,
    pub energy: f32,
    pub mood: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoodVerdict {
    pub primary_mood: String,
    pub mood_category: MoodCategory,
    pub mood_descriptors: Vec<String>,
    /// 0-100, higher the further the playlist sits from the axis center.
    pub confidence: f32,
    pub mood_distribution: MoodDistribution,
    pub top_tracks: Vec<TopTrack>,
}

pub struct MoodClassifier {
    thresholds: ClassifierThresholds,
}

impl MoodClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify aggregated playlist features into a mood verdict.
    pub fn classify(&self, averages: &FeatureAverages, tracks: &[AnalyzedTrack]) -> MoodVerdict {
        let t = &self.thresholds;
        let valence = averages.valence;
        let energy = averages.energy;

        // Exact threshold values resolve toward the high quadrant.
        let (mood_category, primary_mood) =
            match (valence >= t.valence_split, energy >= t.energy_split) {
                (true, true) => (MoodCategory::Upbeat, "Happy & Energetic"),
                (true, false) => (MoodCategory::Chill, "Calm & Content"),
                (false, true) => (MoodCategory::Intense, "Tense & Energetic"),
                (false, false) => (MoodCategory::Melancholic, "Sad & Mellow"),
            };

        let mut mood_descriptors = Vec::new();
        if averages.danceability >= t.danceable_min {
            mood_descriptors.push("danceable".to_string());
        }
        if averages.tempo_bpm >= t.fast_tempo_min_bpm {
            mood_descriptors.push("fast-paced".to_string());
        }
        if averages.tempo_bpm < t.slow_tempo_max_bpm {
            mood_descriptors.push("slow-paced".to_string());
        }
        if averages.acousticness >= t.acoustic_min {
            mood_descriptors.push("acoustic".to_string());
        }
        if averages.instrumentalness >= t.instrumental_min {
            mood_descriptors.push("instrumental".to_string());
        }

        MoodVerdict {
            primary_mood: primary_mood.to_string(),
            mood_category,
            mood_descriptors,
            confidence: confidence_score(valence, energy),
            mood_distribution: self.distribution(tracks),
            top_tracks: self.top_tracks(tracks),
        }
    }

    /// Percentage of tracks in each mood band, rounded to one decimal.
    fn distribution(&self, tracks: &[AnalyzedTrack]) -> MoodDistribution {
        if tracks.is_empty() {
            return MoodDistribution::default();
        }
        let t = &self.thresholds;
        let total = tracks.len() as f32;
        let percent = |count: usize| round1(count as f32 / total * 100.0);

        MoodDistribution {
            happy: percent(
                tracks
                    .iter()
                    .filter(|x| x.features.valence >= t.happy_min)
                    .count(),
            ),
            sad: percent(
                tracks
                    .iter()
                    .filter(|x| x.features.valence < t.sad_max)
                    .count(),
            ),
            energetic: percent(
                tracks
                    .iter()
                    .filter(|x| x.features.energy >= t.energetic_min)
                    .count(),
            ),
            calm: percent(
                tracks
                    .iter()
                    .filter(|x| x.features.energy < t.calm_max)
                    .count(),
            ),
            danceable: percent(
                tracks
                    .iter()
                    .filter(|x| x.features.danceability >= t.danceable_min)
                    .count(),
            ),
        }
    }

    /// The tracks with the most pronounced mood, most pronounced first.
    fn top_tracks(&self, tracks: &[AnalyzedTrack]) -> Vec<TopTrack> {
        let mut ranked: Vec<&AnalyzedTrack> = tracks.iter().collect();
        ranked.sort_by(|a, b| {
            let da = center_distance(a.features.valence, a.features.energy);
            let db = center_distance(b.features.valence, b.features.energy);
            db.partial_cmp(&da).unwrap_or(std::cmp::Ordering::Equal)
        });

        ranked
            .into_iter()
            .take(self.thresholds.top_track_count)
            .map(|track| TopTrack {
                track_id: track.features.track_id.clone(),
                display_name: track.display_name.clone(),
                valence: track.features.valence,
                energy: track.features.energy,
                mood: self.track_mood_label(track.features.valence, track.features.energy),
            })
            .collect()
    }

    /// Label one track's corner of the circumplex. Energy splits at the
    /// energetic threshold; only middling valence stays "Neutral".
    pub fn track_mood_label(&self, valence: f32, energy: f32) -> String {
        let t = &self.thresholds;
        let label = if valence >= t.happy_min && energy >= t.energetic_min {
            "Happy & Energetic"
        } else if valence >= t.happy_min && energy < t.energetic_min {
            "Happy & Calm"
        } else if valence < t.sad_max && energy >= t.energetic_min {
            "Sad & Energetic"
        } else if valence < t.sad_max && energy < t.energetic_min {
            "Sad & Calm"
        } else {
            "Neutral"
        };
        label.to_string()
    }
}

/// Distance of a (valence, energy) point from the axis center.
fn center_distance(valence: f32, energy: f32) -> f32 {
    let dv = valence - 0.5;
    let de = energy - 0.5;
    (dv * dv + de * de).sqrt()
}

/// Map center distance onto a 30-100 score: an average playlist sitting on
/// the quadrant boundary scores 30, a playlist pinned to a corner 100.
fn confidence_score(valence: f32, energy: f32) -> f32 {
    let max_distance = std::f32::consts::FRAC_1_SQRT_2;
    let score = 30.0 + center_distance(valence, energy) / max_distance * 70.0;
    round1(score.clamp(0.0, 100.0))
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
