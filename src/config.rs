//! Configuration for the avatar core
//!
//! [`AvatarConfig`] is what the host hands over for a load. [`EngineConfig`]
//! holds the tuning constants of the blender, the quality controller and the
//! channels, and can be read from a TOML file.

use crate::{AvatarError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Upper bound for emotion cross-fades
pub const MAX_EMOTION_SMOOTHING_MS: u64 = 300;
/// Accepted refresh rates for the frame budget
pub const TARGET_FPS_RANGE: std::ops::RangeInclusive<f32> = 1.0..=480.0;
/// Largest over-budget ratio accepted
pub const MAX_DEGRADE_RATIO: f32 = 10.0;
/// Upper bound for window sizes and channel capacities
pub const MAX_QUEUE_LEN: usize = 4096;

/// Body type trait of an avatar
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    #[default]
    Neutral,
}

/// Visual style trait of an avatar
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarStyle {
    #[default]
    Realistic,
    Cartoon,
    Anime,
    Robot,
}

/// Host-supplied description of the avatar to load
///
/// Immutable once handed to a load. Changing anything means loading a new
/// config, never patching the live one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvatarConfig {
    pub id: String,
    pub name: String,
    /// Opaque asset reference resolved by the loader
    pub model_url: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub style: AvatarStyle,
    /// Free-form host settings. Only `blend.<channel>` keys are read by the core.
    #[serde(default)]
    pub customization: HashMap<String, serde_json::Value>,
}

impl AvatarConfig {
    /// Create a config with default traits and no customization
    pub fn new(id: impl Into<String>, name: impl Into<String>, model_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model_url: model_url.into(),
            gender: Gender::default(),
            style: AvatarStyle::default(),
            customization: HashMap::new(),
        }
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = gender;
        self
    }

    pub fn with_style(mut self, style: AvatarStyle) -> Self {
        self.style = style;
        self
    }

    /// Add a customization entry
    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.customization.insert(key.into(), value);
        self
    }
}

/// Expression blender constants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Duration of an emotion cross-fade
    pub emotion_smoothing_ms: u64,
    /// Audio energy at or below which the mouth is considered closed
    pub energy_floor: f32,
    /// Audio energy mapped to full lip-sync influence
    pub energy_ceiling: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            emotion_smoothing_ms: 180,
            energy_floor: 0.02,
            energy_ceiling: 0.35,
        }
    }
}

impl BlendConfig {
    pub fn smoothing(&self) -> Duration {
        Duration::from_millis(self.emotion_smoothing_ms)
    }
}

/// Adaptive quality constants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Refresh rate the frame budget is derived from
    pub target_fps: f32,
    /// Frames averaged per evaluation window
    pub window_frames: usize,
    /// Average above `budget * degrade_ratio` counts as over budget
    pub degrade_ratio: f32,
    /// Average below `budget * upgrade_ratio` counts as under budget
    pub upgrade_ratio: f32,
    /// Consecutive over-budget windows before stepping down
    pub degrade_windows: u32,
    /// Consecutive under-budget windows before stepping up
    pub upgrade_windows: u32,
    /// Ladder index to start from (0 = highest fidelity)
    pub initial_level: usize,
    /// Ladder index used when frame timing cannot be measured
    pub unmeasured_level: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            window_frames: 30,
            degrade_ratio: 1.2,
            upgrade_ratio: 0.7,
            degrade_windows: 2,
            upgrade_windows: 4,
            initial_level: 0,
            unmeasured_level: 0,
        }
    }
}

impl QualityConfig {
    /// Time allowed per frame; falls back to 60 fps for an unusable rate
    pub fn frame_budget(&self) -> Duration {
        Duration::try_from_secs_f32(1.0 / self.target_fps)
            .ok()
            .filter(|budget| !budget.is_zero())
            .unwrap_or(Duration::from_micros(16_667))
    }
}

/// Audio hand-off constants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Samples retained between two render ticks; older ones are overwritten
    pub inbox_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { inbox_capacity: 64 }
    }
}

/// Complete engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub blend: BlendConfig,
    pub quality: QualityConfig,
    pub audio: AudioConfig,
    /// Capacity of each event subscription
    pub events_capacity: usize,
    /// Capacity of the loader command/event channels
    pub loader_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            blend: BlendConfig::default(),
            quality: QualityConfig::default(),
            audio: AudioConfig::default(),
            events_capacity: 256,
            loader_queue: 16,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an engine configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AvatarError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| AvatarError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| AvatarError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_blend(mut self, blend: BlendConfig) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_quality(mut self, quality: QualityConfig) -> Self {
        self.quality = quality;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let blend = &self.blend;
        if blend.emotion_smoothing_ms == 0 || blend.emotion_smoothing_ms > MAX_EMOTION_SMOOTHING_MS {
            return Err(AvatarError::ConfigError(format!(
                "emotion_smoothing_ms must be in 1..={}, got {}",
                MAX_EMOTION_SMOOTHING_MS, blend.emotion_smoothing_ms
            )));
        }
        if !(blend.energy_floor >= 0.0
            && blend.energy_floor < blend.energy_ceiling
            && blend.energy_ceiling.is_finite())
        {
            return Err(AvatarError::ConfigError(format!(
                "energy_floor ({}) must be non-negative and below energy_ceiling ({})",
                blend.energy_floor, blend.energy_ceiling
            )));
        }

        let quality = &self.quality;
        if !TARGET_FPS_RANGE.contains(&quality.target_fps) {
            return Err(AvatarError::ConfigError(format!(
                "target_fps must be in {}..={}, got {}",
                TARGET_FPS_RANGE.start(),
                TARGET_FPS_RANGE.end(),
                quality.target_fps
            )));
        }
        check_len("window_frames", quality.window_frames)?;
        if quality.degrade_windows == 0 || quality.upgrade_windows == 0 {
            return Err(AvatarError::ConfigError(
                "degrade_windows and upgrade_windows must be non-zero".to_string(),
            ));
        }
        if !(quality.upgrade_ratio > 0.0
            && quality.upgrade_ratio < quality.degrade_ratio
            && quality.degrade_ratio <= MAX_DEGRADE_RATIO)
        {
            return Err(AvatarError::ConfigError(format!(
                "upgrade_ratio ({}) must be positive and below degrade_ratio ({}), which is at most {}",
                quality.upgrade_ratio, quality.degrade_ratio, MAX_DEGRADE_RATIO
            )));
        }

        check_len("inbox_capacity", self.audio.inbox_capacity)?;
        check_len("events_capacity", self.events_capacity)?;
        check_len("loader_queue", self.loader_queue)?;
        if self.events_capacity < 2 {
            return Err(AvatarError::ConfigError("events_capacity must be at least 2".to_string()));
        }

        Ok(())
    }
}

fn check_len(name: &str, value: usize) -> Result<()> {
    if value == 0 || value > MAX_QUEUE_LEN {
        return Err(AvatarError::ConfigError(format!(
            "{} must be in 1..={}, got {}",
            name, MAX_QUEUE_LEN, value
        )));
    }
    Ok(())
}
