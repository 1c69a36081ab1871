//! Expression & lip-sync blender
//!
//! Combines the smoothed emotion expression with audio-driven visemes:
//!
//! `weight = emotion * (1 - influence) + visemes * influence`
//!
//! where `influence` is the normalized energy of the newest fresh audio
//! sample, or 0 when there is none.

use crate::config::BlendConfig;
use crate::expression::emotion::{BlendChannel, ChannelWeights, EmotionType};
use crate::expression::lipsync::{normalized_energy, viseme_weights, AudioAnalysisResult};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

/// Prefix of customization keys that bias a blend channel
pub const BLEND_BIAS_PREFIX: &str = "blend.";

fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Per-frame blend-shape weight producer
#[derive(Debug)]
pub struct ExpressionBlender {
    config: BlendConfig,
    emotion: EmotionType,
    /// Expression at the moment the current transition started
    from: ChannelWeights,
    target: ChannelWeights,
    elapsed: Duration,
    emotion_weights: ChannelWeights,
    latest_sample: Option<AudioAnalysisResult>,
    lip_sync_active: bool,
    influence: f32,
    bias: Vec<(BlendChannel, f32)>,
    output: ChannelWeights,
}

impl ExpressionBlender {
    pub fn new(config: BlendConfig) -> Self {
        let rest = EmotionType::default().target_weights();
        Self {
            config,
            emotion: EmotionType::default(),
            from: rest,
            target: rest,
            elapsed: Duration::ZERO,
            emotion_weights: rest,
            latest_sample: None,
            lip_sync_active: false,
            influence: 0.0,
            bias: Vec::new(),
            output: rest,
        }
    }

    /// Record a new target emotion
    ///
    /// The transition starts from whatever expression is currently shown, so
    /// interrupting a fade never pops.
    pub fn set_emotion(&mut self, emotion: EmotionType) {
        if emotion == self.emotion {
            return;
        }
        debug!("Emotion {} -> {}", self.emotion, emotion);
        self.emotion = emotion;
        self.from = self.emotion_weights;
        self.target = emotion.target_weights();
        self.elapsed = Duration::ZERO;
    }

    /// Record an audio sample. Older samples than the one held are ignored.
    pub fn update_lip_sync(&mut self, sample: AudioAnalysisResult) {
        match &self.latest_sample {
            Some(latest) if latest.timestamp > sample.timestamp => {}
            _ => self.latest_sample = Some(sample),
        }
    }

    /// Read `blend.<channel>` biases from a config's customization map
    pub fn set_customization(&mut self, customization: &HashMap<String, serde_json::Value>) {
        self.bias.clear();
        for (key, value) in customization {
            let Some(shape) = key.strip_prefix(BLEND_BIAS_PREFIX) else {
                continue;
            };
            match (BlendChannel::from_shape_name(shape), value.as_f64()) {
                (Some(channel), Some(bias)) => self.bias.push((channel, bias as f32)),
                _ => debug!("Ignoring customization key {}", key),
            }
        }
    }

    pub fn clear_customization(&mut self) {
        self.bias.clear();
    }

    /// Advance smoothing by `dt` and recompute the output weights
    pub fn tick(&mut self, now: Duration, dt: Duration, frame_interval: Duration) -> &ChannelWeights {
        self.elapsed = self.elapsed.saturating_add(dt);
        let window = self.config.smoothing();
        let t = if window.is_zero() {
            1.0
        } else {
            self.elapsed.as_secs_f32() / window.as_secs_f32()
        };
        self.emotion_weights = if t >= 1.0 {
            self.target
        } else {
            self.from.lerp(&self.target, smoothstep(t))
        };

        let fresh = self
            .latest_sample
            .filter(|sample| sample.is_fresh(now, frame_interval));
        if fresh.is_none() && self.latest_sample.is_some() {
            trace!("Lip-sync sample went stale");
            self.latest_sample = None;
        }

        self.output = match fresh {
            Some(sample) => {
                self.lip_sync_active = true;
                self.influence = normalized_energy(sample.energy, &self.config);
                let visemes = viseme_weights(&sample, &self.config);
                self.emotion_weights.mix(&visemes, self.influence)
            }
            None => {
                self.lip_sync_active = false;
                self.influence = 0.0;
                self.emotion_weights
            }
        }
        .biased(&self.bias);

        &self.output
    }

    pub fn current_emotion(&self) -> EmotionType {
        self.emotion
    }

    pub fn is_transitioning(&self) -> bool {
        self.emotion_weights != self.target
    }

    pub fn lip_sync_active(&self) -> bool {
        self.lip_sync_active
    }

    pub fn influence(&self) -> f32 {
        self.influence
    }

    pub fn output(&self) -> &ChannelWeights {
        &self.output
    }
}
