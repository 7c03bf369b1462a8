//! Configuration structures for the analysis pipeline.
//!
//! Every tuning knob lives in an explicit settings struct handed to the
//! component that uses it, so alternate policies are swappable without
//! touching call sites. Defaults carry the values the pipeline ships with.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSetting {
        name,
        reason: reason.into(),
    }
}

/// OAuth state and token lifecycle settings.
#[derive(Debug, Clone)]
pub struct OauthSettings {
    /// How long an issued CSRF state stays consumable.
    pub state_ttl_secs: u64,
    /// Tokens expiring within this window count as stale and get refreshed.
    pub refresh_skew_secs: u64,
}

impl Default for OauthSettings {
    fn default() -> Self {
        Self {
            state_ttl_secs: 600, // 10 minutes
            refresh_skew_secs: 60,
        }
    }
}

/// Upstream music service endpoints and client identity.
#[derive(Debug, Clone)]
pub struct MusicServiceConfig {
    pub api_base_url: String,
    pub accounts_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Timeout for playlist and token endpoint calls.
    pub timeout_secs: u64,
    /// Page size for playlist track listing.
    pub page_size: usize,
}

impl Default for MusicServiceConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.spotify.com/v1".to_string(),
            accounts_base_url: "https://accounts.spotify.com".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scopes: vec![
                "user-read-private".to_string(),
                "playlist-read-private".to_string(),
                "playlist-read-collaborative".to_string(),
            ],
            timeout_secs: 30,
            page_size: 100,
        }
    }
}

/// Worker pool and fetch bounds for the per-track pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum tracks analyzed concurrently.
    pub worker_count: usize,
    /// Per-track preview fetch timeout.
    pub fetch_timeout_secs: u64,
    /// Hard cap on a single preview clip's size.
    pub max_preview_bytes: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            fetch_timeout_secs: 10,
            max_preview_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(invalid("worker_count", "must be at least 1"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(invalid("fetch_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }
}

/// Framing and gating parameters for raw feature extraction.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    /// Analyze at most this much audio from the start of the clip.
    pub analysis_window_secs: f32,
    /// Clips shorter than this fail extraction outright.
    pub min_duration_secs: f32,
    /// Analysis frame length in samples. Must be a power of two.
    pub frame_len: usize,
    /// Hop between frame starts in samples.
    pub hop_len: usize,
    /// Peak amplitude at or below this counts as silence.
    pub silence_floor: f32,
    /// Tempo search range and prior center.
    pub min_tempo_bpm: f32,
    pub max_tempo_bpm: f32,
    pub tempo_prior_bpm: f32,
    /// Peak onset flux below this fraction of the mean envelope level counts
    /// as an unmodulated envelope, which falls back to the tempo prior.
    pub tempo_flux_floor: f32,
    /// Frequency band contributing to the chroma vector.
    pub chroma_low_hz: f32,
    pub chroma_high_hz: f32,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            analysis_window_secs: 30.0,
            min_duration_secs: 10.0,
            frame_len: 2048,
            hop_len: 1024, // 50% overlap
            silence_floor: 1e-4,
            min_tempo_bpm: 60.0,
            max_tempo_bpm: 200.0,
            tempo_prior_bpm: 120.0,
            tempo_flux_floor: 0.01,
            chroma_low_hz: 55.0,
            chroma_high_hz: 5000.0,
        }
    }
}

impl ExtractionSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frame_len.is_power_of_two() || self.frame_len < 64 {
            return Err(invalid("frame_len", "must be a power of two >= 64"));
        }
        if self.hop_len == 0 || self.hop_len > self.frame_len {
            return Err(invalid("hop_len", "must be in 1..=frame_len"));
        }
        if self.min_duration_secs <= 0.0 || self.min_duration_secs > self.analysis_window_secs {
            return Err(invalid(
                "min_duration_secs",
                "must be positive and within the analysis window",
            ));
        }
        if self.min_tempo_bpm <= 0.0 || self.min_tempo_bpm >= self.max_tempo_bpm {
            return Err(invalid("min_tempo_bpm", "must be below max_tempo_bpm"));
        }
        if self.tempo_prior_bpm < self.min_tempo_bpm || self.tempo_prior_bpm > self.max_tempo_bpm {
            return Err(invalid(
                "tempo_prior_bpm",
                "must lie within the tempo search range",
            ));
        }
        if !(0.0..1.0).contains(&self.tempo_flux_floor) {
            return Err(invalid("tempo_flux_floor", "must be in [0, 1)"));
        }
        if self.chroma_low_hz <= 0.0 || self.chroma_low_hz >= self.chroma_high_hz {
            return Err(invalid("chroma_low_hz", "must be below chroma_high_hz"));
        }
        Ok(())
    }
}

/// Weights for mapping raw measurements to bounded scores.
///
/// Paired weights blend two [0,1] terms, so each pair must sum to 1 to keep
/// the blended score in [0,1].
#[derive(Debug, Clone)]
pub struct NormalizerWeights {
    pub valence_brightness_weight: f32,
    pub valence_tempo_weight: f32,
    /// Tempo at or above this normalizes to 1.0.
    pub tempo_ceiling_bpm: f32,
    /// Tempo with the best danceability fit.
    pub dance_optimal_bpm: f32,
    pub dance_tempo_weight: f32,
    pub dance_energy_weight: f32,
    pub acoustic_tonality_weight: f32,
    pub acoustic_steadiness_weight: f32,
    pub instrumental_tonality_weight: f32,
    pub instrumental_steadiness_weight: f32,
}

impl Default for NormalizerWeights {
    fn default() -> Self {
        Self {
            valence_brightness_weight: 0.6,
            valence_tempo_weight: 0.4,
            tempo_ceiling_bpm: 200.0,
            dance_optimal_bpm: 110.0,
            dance_tempo_weight: 0.5,
            dance_energy_weight: 0.5,
            acoustic_tonality_weight: 0.6,
            acoustic_steadiness_weight: 0.4,
            instrumental_tonality_weight: 0.4,
            instrumental_steadiness_weight: 0.6,
        }
    }
}

impl NormalizerWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pairs: [(&'static str, f32, f32); 4] = [
            (
                "valence weights",
                self.valence_brightness_weight,
                self.valence_tempo_weight,
            ),
            (
                "danceability weights",
                self.dance_tempo_weight,
                self.dance_energy_weight,
            ),
            (
                "acousticness weights",
                self.acoustic_tonality_weight,
                self.acoustic_steadiness_weight,
            ),
            (
                "instrumentalness weights",
                self.instrumental_tonality_weight,
                self.instrumental_steadiness_weight,
            ),
        ];
        for (name, a, b) in pairs {
            if a < 0.0 || b < 0.0 || (a + b - 1.0).abs() > 1e-3 {
                return Err(invalid(name, "pair must be non-negative and sum to 1.0"));
            }
        }
        if self.tempo_ceiling_bpm <= 0.0 {
            return Err(invalid("tempo_ceiling_bpm", "must be positive"));
        }
        if self.dance_optimal_bpm <= 0.0 {
            return Err(invalid("dance_optimal_bpm", "must be positive"));
        }
        Ok(())
    }
}

/// Quadrant splits, descriptor thresholds, and distribution bands for the
/// classifier.
#[derive(Debug, Clone)]
pub struct ClassifierThresholds {
    /// Valence/energy midpoints dividing the circumplex quadrants.
    pub valence_split: f32,
    pub energy_split: f32,
    /// Descriptor tag thresholds, in rule evaluation order.
    pub danceable_min: f32,
    pub fast_tempo_min_bpm: f32,
    pub slow_tempo_max_bpm: f32,
    pub acoustic_min: f32,
    pub instrumental_min: f32,
    /// Per-track distribution bands.
    pub happy_min: f32,
    pub sad_max: f32,
    pub energetic_min: f32,
    pub calm_max: f32,
    /// How many standout tracks the verdict reports.
    pub top_track_count: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            valence_split: 0.5,
            energy_split: 0.5,
            danceable_min: 0.6,
            fast_tempo_min_bpm: 120.0,
            slow_tempo_max_bpm: 90.0,
            acoustic_min: 0.6,
            instrumental_min: 0.6,
            happy_min: 0.6,
            sad_max: 0.4,
            energetic_min: 0.6,
            calm_max: 0.4,
            top_track_count: 5,
        }
    }
}

/// Everything the `PlaylistAnalyzer` needs, bundled.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerSettings {
    pub pipeline: PipelineSettings,
    pub extraction: ExtractionSettings,
    pub weights: NormalizerWeights,
    pub thresholds: ClassifierThresholds,
}

impl AnalyzerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.extraction.validate()?;
        self.weights.validate()?;
        Ok(())
    }
}
