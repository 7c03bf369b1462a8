//! Audio and domain fixtures for end-to-end tests.
//!
//! Preview audio is generated as 16-bit PCM WAV at 11025 Hz, long enough
//! to clear the extractor's minimum-duration gate while keeping the FFT
//! work per test small.

use chrono::{Duration, Utc};
use moodscope::{OAuthCredential, TrackRef};
use std::f32::consts::PI;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const FIXTURE_RATE: u32 = 11025;

/// Initialize test logging, controlled by RUST_LOG. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();
}

/// Minimal 16-bit PCM WAV container around raw samples.
pub fn wav_bytes(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// A steady tone. Flat dynamics, so its normalized energy is zero.
pub fn sine_wav(freq: f32, secs: f32) -> Vec<u8> {
    let len = (secs * FIXTURE_RATE as f32) as usize;
    let samples: Vec<f32> = (0..len)
        .map(|i| (2.0 * PI * freq * i as f32 / FIXTURE_RATE as f32).sin() * 0.5)
        .collect();
    wav_bytes(&samples, FIXTURE_RATE, 1)
}

/// Decaying click bursts at the given tempo. Strong dynamics and a clear
/// beat, good for tempo and energy assertions.
pub fn click_wav(bpm: f32, secs: f32) -> Vec<u8> {
    let len = (secs * FIXTURE_RATE as f32) as usize;
    let beat_period = (60.0 / bpm * FIXTURE_RATE as f32) as usize;
    let burst = 1024.min(beat_period / 2);

    let mut samples = vec![0.0f32; len];
    let mut beat = 0;
    while beat < len {
        for i in 0..burst.min(len - beat) {
            let decay = 1.0 - i as f32 / burst as f32;
            samples[beat + i] = 0.8 * decay * if i % 2 == 0 { 1.0 } else { -1.0 };
        }
        beat += beat_period;
    }
    wav_bytes(&samples, FIXTURE_RATE, 1)
}

pub fn silent_wav(secs: f32) -> Vec<u8> {
    let len = (secs * FIXTURE_RATE as f32) as usize;
    wav_bytes(&vec![0.0; len], FIXTURE_RATE, 1)
}

pub fn track(id: &str, preview: Option<&str>) -> TrackRef {
    TrackRef {
        track_id: id.to_string(),
        display_name: format!("Artist - {id}"),
        preview_reference: preview.map(str::to_string),
    }
}

pub fn credential(user_id: &str, expires_in_secs: i64) -> OAuthCredential {
    OAuthCredential {
        user_id: user_id.to_string(),
        access_token: format!("access-{user_id}"),
        refresh_token: format!("refresh-{user_id}"),
        expires_at: Utc::now() + Duration::seconds(expires_in_secs),
    }
}

/// Pull the `state` query parameter out of an authorize URL.
pub fn state_param(url: &str) -> String {
    url.split("state=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .expect("authorize URL has no state parameter")
        .to_string()
}
