//! Audio-driven lip-sync
//!
//! Samples arrive at audio-callback rate and are consumed at render rate.
//! Only the newest sample matters, and only while it is younger than one
//! frame interval.

use crate::config::BlendConfig;
use crate::expression::emotion::{BlendChannel, ChannelWeights};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Energy split across three frequency bands
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandEnergies {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandEnergies {
    pub fn total(&self) -> f32 {
        self.low + self.mid + self.high
    }
}

/// Snapshot of audio features for one analysis frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysisResult {
    /// Capture time on the same clock the render loop ticks on
    pub timestamp: Duration,
    /// RMS amplitude
    pub energy: f32,
    /// Peak absolute amplitude
    pub peak: f32,
    pub bands: Option<BandEnergies>,
}

impl AudioAnalysisResult {
    pub fn new(timestamp: Duration, energy: f32) -> Self {
        Self {
            timestamp,
            energy,
            peak: energy,
            bands: None,
        }
    }

    pub fn with_bands(mut self, bands: BandEnergies) -> Self {
        self.bands = Some(bands);
        self
    }

    /// Pull a timestamp from the future back to `now`, so a skewed producer
    /// clock cannot keep the sample fresh
    pub fn clamped_to(mut self, now: Duration) -> Self {
        self.timestamp = self.timestamp.min(now);
        self
    }

    /// Whether this sample is recent enough to drive the mouth at `now`
    pub fn is_fresh(&self, now: Duration, frame_interval: Duration) -> bool {
        now.saturating_sub(self.timestamp) <= frame_interval
    }
}

/// Map raw energy onto [0, 1] between the configured floor and ceiling
pub fn normalized_energy(energy: f32, config: &BlendConfig) -> f32 {
    if !energy.is_finite() {
        return 0.0;
    }
    let span = config.energy_ceiling - config.energy_floor;
    if span <= 0.0 {
        return 0.0;
    }
    ((energy - config.energy_floor) / span).clamp(0.0, 1.0)
}

/// Mouth shapes for one sample
///
/// Without band data the whole opening goes to the open vowel. With band
/// data, low energy favors "aa", mid "oh" and high "ee".
pub fn viseme_weights(sample: &AudioAnalysisResult, config: &BlendConfig) -> ChannelWeights {
    let open = normalized_energy(sample.energy, config);
    let mut weights = ChannelWeights::zero();
    weights.set(BlendChannel::MouthOpen, open);

    match sample.bands {
        Some(bands) if bands.total() > f32::EPSILON => {
            let total = bands.total();
            weights.set(BlendChannel::VisemeAA, open * bands.low / total);
            weights.set(BlendChannel::VisemeOH, open * bands.mid / total);
            weights.set(BlendChannel::VisemeEE, open * bands.high / total);
        }
        _ => weights.set(BlendChannel::VisemeAA, open),
    }

    weights
}
