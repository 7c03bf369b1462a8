//! Audio analysis module
//!
//! Everything between raw preview bytes and per-track normalized metrics:
//! - symphonia-based decoding to mono PCM
//! - frame-level spectral primitives (FFT, centroid, chroma)
//! - raw feature extraction (tempo, envelope, chroma, loudness)
//! - normalization onto the common [0,1] metric scale

mod decode;
mod extractor;
mod normalize;
pub mod spectral;

pub use decode::{decode_preview, DecodeError, DecodedAudio};
pub use extractor::{ExtractError, RawTrackFeatures, TrackFeatureExtractor};
pub use normalize::{min_max_normalize, FeatureNormalizer, NormalizedTrackFeatures};
