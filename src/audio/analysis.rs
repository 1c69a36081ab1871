//! PCM frame analysis for lip-sync
//!
//! Hosts that only have raw audio can turn each callback buffer into an
//! [`AudioAnalysisResult`] here. Bands come from two one-pole low-pass
//! filters: below `LOW_CUTOFF_HZ`, between the cutoffs, and above
//! `HIGH_CUTOFF_HZ`.

use crate::expression::{AudioAnalysisResult, BandEnergies};
use std::f32::consts::PI;
use std::time::Duration;

pub const LOW_CUTOFF_HZ: f32 = 300.0;
pub const HIGH_CUTOFF_HZ: f32 = 2000.0;

fn one_pole_alpha(cutoff_hz: f32, sample_rate: u32) -> f32 {
    1.0 - (-2.0 * PI * cutoff_hz / sample_rate as f32).exp()
}

/// Analyze one buffer of mono samples in [-1, 1]
pub fn analyze_frame(samples: &[f32], sample_rate: u32, timestamp: Duration) -> AudioAnalysisResult {
    if samples.is_empty() || sample_rate == 0 {
        return AudioAnalysisResult::new(timestamp, 0.0);
    }

    let low_alpha = one_pole_alpha(LOW_CUTOFF_HZ, sample_rate);
    let high_alpha = one_pole_alpha(HIGH_CUTOFF_HZ, sample_rate);

    let mut low_state = 0.0f32;
    let mut high_state = 0.0f32;
    let mut sum_sq = 0.0f32;
    let mut peak = 0.0f32;
    let mut low_sq = 0.0f32;
    let mut mid_sq = 0.0f32;
    let mut high_sq = 0.0f32;

    for &x in samples {
        let x = if x.is_finite() { x } else { 0.0 };
        sum_sq += x * x;
        peak = peak.max(x.abs());

        low_state += low_alpha * (x - low_state);
        high_state += high_alpha * (x - high_state);

        let low = low_state;
        let mid = high_state - low_state;
        let high = x - high_state;
        low_sq += low * low;
        mid_sq += mid * mid;
        high_sq += high * high;
    }

    let n = samples.len() as f32;
    AudioAnalysisResult {
        timestamp,
        energy: (sum_sq / n).sqrt(),
        peak,
        bands: Some(BandEnergies {
            low: (low_sq / n).sqrt(),
            mid: (mid_sq / n).sqrt(),
            high: (high_sq / n).sqrt(),
        }),
    }
}
