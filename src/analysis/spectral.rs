//! Frame-level spectral primitives.
//!
//! Small self-contained DSP kernel used by the feature extractor: Hann
//! windowing, an iterative radix-2 FFT, and the per-frame measurements
//! (RMS, magnitude spectrum, spectral centroid, chroma accumulation).

use std::f32::consts::PI;

/// Hann window of the given length.
pub fn hann_window(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| {
            let phase = 2.0 * PI * i as f32 / (len - 1) as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Root mean square of a frame.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

/// In-place iterative radix-2 FFT (decimation in time).
///
/// `re` and `im` must have the same power-of-two length.
pub fn fft_in_place(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();
    debug_assert_eq!(n, im.len());
    debug_assert!(n.is_power_of_two());
    if n < 2 {
        return;
    }

    // Bit-reversal permutation.
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = ((i as u32).reverse_bits() >> (32 - bits)) as usize;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    // Butterfly passes with doubling span.
    let mut len = 2;
    while len <= n {
        let half = len / 2;
        let step = -2.0 * PI / len as f32;
        for start in (0..n).step_by(len) {
            for offset in 0..half {
                let (tw_im, tw_re) = (step * offset as f32).sin_cos();
                let a = start + offset;
                let b = a + half;
                let t_re = tw_re * re[b] - tw_im * im[b];
                let t_im = tw_re * im[b] + tw_im * re[b];
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
            }
        }
        len *= 2;
    }
}

/// Magnitude spectrum of a windowed frame, bins `0..=len/2`.
pub fn magnitude_spectrum(frame: &[f32], window: &[f32]) -> Vec<f32> {
    debug_assert_eq!(frame.len(), window.len());
    let n = frame.len();

    let mut re: Vec<f32> = frame.iter().zip(window).map(|(s, w)| s * w).collect();
    let mut im = vec![0.0f32; n];
    fft_in_place(&mut re, &mut im);

    (0..=n / 2)
        .map(|k| (re[k] * re[k] + im[k] * im[k]).sqrt())
        .collect()
}

/// Width of one FFT bin in Hz.
pub fn bin_hz(sample_rate: u32, frame_len: usize) -> f32 {
    sample_rate as f32 / frame_len as f32
}

/// Power-weighted mean frequency of a spectrum, in Hz.
///
/// Weighting by power rather than raw magnitude keeps window leakage tails
/// and the FFT noise floor from dragging a narrowband frame's centroid
/// toward mid-spectrum. Returns 0 for an empty (silent) spectrum.
pub fn spectral_centroid(spectrum: &[f32], sample_rate: u32, frame_len: usize) -> f32 {
    let hz_per_bin = bin_hz(sample_rate, frame_len);
    let mut weighted = 0.0f32;
    let mut total = 0.0f32;
    for (k, &mag) in spectrum.iter().enumerate() {
        let power = mag * mag;
        weighted += k as f32 * hz_per_bin * power;
        total += power;
    }
    if total <= f32::EPSILON {
        0.0
    } else {
        weighted / total
    }
}

/// Fold one frame's spectral energy into a 12-bin pitch-class profile.
///
/// Bins between `low_hz` and `high_hz` are mapped to their nearest
/// equal-tempered pitch class (index 0 is C, so A4 at 440 Hz lands on
/// index 9) and their power is added to `chroma`.
pub fn accumulate_chroma(
    spectrum: &[f32],
    sample_rate: u32,
    frame_len: usize,
    low_hz: f32,
    high_hz: f32,
    chroma: &mut [f32; 12],
) {
    let hz_per_bin = bin_hz(sample_rate, frame_len);
    for (k, &mag) in spectrum.iter().enumerate().skip(1) {
        let freq = k as f32 * hz_per_bin;
        if freq < low_hz || freq > high_hz {
            continue;
        }
        let midi = 69.0 + 12.0 * (freq / 440.0).log2();
        let class = (midi.round() as i32).rem_euclid(12) as usize;
        chroma[class] += mag * mag;
    }
}
