//! Preview audio decoding using symphonia.
//!
//! Turns fetched preview bytes into mono f32 PCM for feature extraction.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported audio container: {0}")]
    Unsupported(String),
    #[error("no audio track in container")]
    NoAudioTrack,
    #[error("audio decode failed: {0}")]
    Failed(String),
}

/// Decoded preview audio, downmixed to mono.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode preview bytes to mono f32 samples.
///
/// The container format is sniffed from the content, so MP3, OGG, WAV and
/// the other symphonia formats all work without a filename hint.
pub fn decode_preview(bytes: Vec<u8>) -> Result<DecodedAudio, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Failed("sample rate not declared".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Failed(format!("failed to create decoder: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                match decoder.decode(&packet) {
                    Ok(decoded) => {
                        let spec = *decoded.spec();
                        let mut sample_buf =
                            SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
                        sample_buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(sample_buf.samples());
                    }
                    Err(SymphoniaError::DecodeError(e)) => {
                        // A damaged packet is skipped, the rest of the
                        // preview still decodes.
                        warn!("Decode error, skipping packet: {}", e);
                        continue;
                    }
                    Err(e) => {
                        return Err(DecodeError::Failed(e.to_string()));
                    }
                }
            }
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => {
                warn!("Error reading packet, stopping decode: {}", e);
                break;
            }
        }
    }

    if samples.is_empty() {
        return Err(DecodeError::Failed("no audio samples decoded".to_string()));
    }

    let samples = downmix_to_mono(samples, channels);
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels down to a single mono signal.
fn downmix_to_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
