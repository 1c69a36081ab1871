//! Emotion vocabulary and blend-shape channel weights
//!
//! The blender works on a fixed set of expression channels. Models map their
//! own blend-shape names onto these channels at load time.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Discrete emotional state pushed by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionType {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Thinking,
}

impl EmotionType {
    pub fn all() -> &'static [EmotionType] {
        &[
            EmotionType::Neutral,
            EmotionType::Happy,
            EmotionType::Sad,
            EmotionType::Angry,
            EmotionType::Surprised,
            EmotionType::Thinking,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionType::Neutral => "neutral",
            EmotionType::Happy => "happy",
            EmotionType::Sad => "sad",
            EmotionType::Angry => "angry",
            EmotionType::Surprised => "surprised",
            EmotionType::Thinking => "thinking",
        }
    }

    /// Resting expression for this emotion
    pub fn target_weights(&self) -> ChannelWeights {
        use BlendChannel::*;
        let pairs: &[(BlendChannel, f32)] = match self {
            EmotionType::Neutral => &[],
            EmotionType::Happy => &[(MouthSmile, 0.8), (CheekRaise, 0.5), (EyeSquint, 0.3)],
            EmotionType::Sad => &[(MouthFrown, 0.7), (BrowInnerUp, 0.6), (EyeSquint, 0.1)],
            EmotionType::Angry => &[(BrowDown, 0.8), (MouthFrown, 0.4), (EyeSquint, 0.4)],
            EmotionType::Surprised => &[(EyeWide, 0.9), (BrowInnerUp, 0.8), (MouthOpen, 0.4)],
            EmotionType::Thinking => &[(BrowDown, 0.3), (EyeSquint, 0.25), (MouthFrown, 0.1)],
        };
        ChannelWeights::from_pairs(pairs)
    }
}

impl std::fmt::Display for EmotionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmotionType::all()
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown emotion: {}", s))
    }
}

/// Expression channel driven by the blender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendChannel {
    MouthOpen,
    MouthSmile,
    MouthFrown,
    BrowInnerUp,
    BrowDown,
    EyeWide,
    EyeSquint,
    CheekRaise,
    VisemeAA,
    VisemeEE,
    VisemeOH,
}

impl BlendChannel {
    pub const COUNT: usize = 11;

    pub fn all() -> &'static [BlendChannel] {
        &[
            BlendChannel::MouthOpen,
            BlendChannel::MouthSmile,
            BlendChannel::MouthFrown,
            BlendChannel::BrowInnerUp,
            BlendChannel::BrowDown,
            BlendChannel::EyeWide,
            BlendChannel::EyeSquint,
            BlendChannel::CheekRaise,
            BlendChannel::VisemeAA,
            BlendChannel::VisemeEE,
            BlendChannel::VisemeOH,
        ]
    }

    /// Blend-shape name a model uses for this channel
    pub fn shape_name(&self) -> &'static str {
        match self {
            BlendChannel::MouthOpen => "mouthOpen",
            BlendChannel::MouthSmile => "mouthSmile",
            BlendChannel::MouthFrown => "mouthFrown",
            BlendChannel::BrowInnerUp => "browInnerUp",
            BlendChannel::BrowDown => "browDown",
            BlendChannel::EyeWide => "eyeWide",
            BlendChannel::EyeSquint => "eyeSquint",
            BlendChannel::CheekRaise => "cheekRaise",
            BlendChannel::VisemeAA => "viseme_aa",
            BlendChannel::VisemeEE => "viseme_ee",
            BlendChannel::VisemeOH => "viseme_oh",
        }
    }

    pub fn from_shape_name(name: &str) -> Option<BlendChannel> {
        BlendChannel::all()
            .iter()
            .copied()
            .find(|c| c.shape_name().eq_ignore_ascii_case(name))
    }

    pub fn is_viseme(&self) -> bool {
        matches!(
            self,
            BlendChannel::VisemeAA | BlendChannel::VisemeEE | BlendChannel::VisemeOH
        )
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// One weight in [0, 1] per [`BlendChannel`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelWeights([f32; BlendChannel::COUNT]);

impl ChannelWeights {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(BlendChannel, f32)]) -> Self {
        let mut weights = Self::zero();
        for &(channel, value) in pairs {
            weights.set(channel, value);
        }
        weights
    }

    pub fn get(&self, channel: BlendChannel) -> f32 {
        self.0[channel.index()]
    }

    /// Set a weight, clamped to [0, 1]
    pub fn set(&mut self, channel: BlendChannel, value: f32) {
        self.0[channel.index()] = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlendChannel, f32)> + '_ {
        BlendChannel::all().iter().map(move |&c| (c, self.get(c)))
    }

    /// Linear interpolation towards `other`
    pub fn lerp(&self, other: &ChannelWeights, t: f32) -> ChannelWeights {
        let t = t.clamp(0.0, 1.0);
        let mut out = ChannelWeights::zero();
        for (i, value) in out.0.iter_mut().enumerate() {
            *value = (self.0[i] + (other.0[i] - self.0[i]) * t).clamp(0.0, 1.0);
        }
        out
    }

    /// `self * (1 - influence) + other * influence`
    pub fn mix(&self, other: &ChannelWeights, influence: f32) -> ChannelWeights {
        self.lerp(other, influence)
    }

    /// Add a signed bias per channel, clamping the result
    pub fn biased(&self, bias: &[(BlendChannel, f32)]) -> ChannelWeights {
        let mut out = *self;
        for &(channel, delta) in bias {
            out.set(channel, self.get(channel) + delta);
        }
        out
    }

    /// Largest absolute per-channel difference
    pub fn max_delta(&self, other: &ChannelWeights) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_parse() {
        assert_eq!("Happy".parse::<EmotionType>(), Ok(EmotionType::Happy));
        assert_eq!(" thinking ".parse::<EmotionType>(), Ok(EmotionType::Thinking));
        assert!("bored".parse::<EmotionType>().is_err());
    }

    #[test]
    fn test_neutral_is_rest() {
        assert_eq!(EmotionType::Neutral.target_weights(), ChannelWeights::zero());
    }

    #[test]
    fn test_targets_in_range() {
        for emotion in EmotionType::all() {
            for (_, w) in emotion.target_weights().iter() {
                assert!((0.0..=1.0).contains(&w));
            }
        }
    }

    #[test]
    fn test_channel_names_roundtrip() {
        assert_eq!(BlendChannel::all().len(), BlendChannel::COUNT);
        for channel in BlendChannel::all() {
            assert_eq!(BlendChannel::from_shape_name(channel.shape_name()), Some(*channel));
        }
        assert_eq!(BlendChannel::from_shape_name("tongueOut"), None);
    }

    #[test]
    fn test_mix() {
        let happy = EmotionType::Happy.target_weights();
        let mouth = ChannelWeights::from_pairs(&[(BlendChannel::MouthOpen, 1.0)]);

        let mixed = happy.mix(&mouth, 0.5);
        assert!((mixed.get(BlendChannel::MouthSmile) - 0.4).abs() < 1e-6);
        assert!((mixed.get(BlendChannel::MouthOpen) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_set_clamps() {
        let mut weights = ChannelWeights::zero();
        weights.set(BlendChannel::EyeWide, 1.7);
        weights.set(BlendChannel::EyeSquint, -0.3);
        weights.set(BlendChannel::BrowDown, f32::NAN);
        assert_eq!(weights.get(BlendChannel::EyeWide), 1.0);
        assert_eq!(weights.get(BlendChannel::EyeSquint), 0.0);
        assert_eq!(weights.get(BlendChannel::BrowDown), 0.0);
    }

    #[test]
    fn test_biased() {
        let base = EmotionType::Happy.target_weights();
        let out = base.biased(&[(BlendChannel::MouthSmile, 0.5), (BlendChannel::BrowDown, -0.2)]);
        assert_eq!(out.get(BlendChannel::MouthSmile), 1.0);
        assert_eq!(out.get(BlendChannel::BrowDown), 0.0);
    }
}
