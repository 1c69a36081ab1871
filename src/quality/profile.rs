//! Quality ladder
//!
//! Level 0 is the highest fidelity. The controller moves one level at a time.

/// Render settings for one rung of the ladder
#[derive(Debug, Clone, PartialEq)]
pub struct QualityProfile {
    pub name: &'static str,
    /// Render-target scale relative to the viewport's logical size
    pub pixel_ratio: f32,
    pub shadow_map_size: u32,
    pub max_lights: u32,
    /// Background objects cast and receive shadows
    pub static_shadows: bool,
    /// Detailed objects (the avatar) cast and receive shadows
    pub dynamic_shadows: bool,
    /// LOD index for background objects (0 = full detail)
    pub static_lod: u8,
    /// LOD index for detailed objects
    pub dynamic_lod: u8,
}

impl QualityProfile {
    pub fn shadows_enabled(&self) -> bool {
        self.static_shadows || self.dynamic_shadows
    }
}

/// Ordered list of profiles, highest fidelity first
#[derive(Debug, Clone, PartialEq)]
pub struct QualityLadder {
    profiles: Vec<QualityProfile>,
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self::new(vec![
            QualityProfile {
                name: "ultra",
                pixel_ratio: 2.0,
                shadow_map_size: 2048,
                max_lights: 4,
                static_shadows: true,
                dynamic_shadows: true,
                static_lod: 0,
                dynamic_lod: 0,
            },
            QualityProfile {
                name: "high",
                pixel_ratio: 1.5,
                shadow_map_size: 2048,
                max_lights: 3,
                static_shadows: true,
                dynamic_shadows: true,
                static_lod: 0,
                dynamic_lod: 0,
            },
            // background loses shadows first
            QualityProfile {
                name: "medium",
                pixel_ratio: 1.25,
                shadow_map_size: 1024,
                max_lights: 2,
                static_shadows: false,
                dynamic_shadows: true,
                static_lod: 1,
                dynamic_lod: 0,
            },
            QualityProfile {
                name: "low",
                pixel_ratio: 1.0,
                shadow_map_size: 512,
                max_lights: 1,
                static_shadows: false,
                dynamic_shadows: true,
                static_lod: 2,
                dynamic_lod: 1,
            },
            QualityProfile {
                name: "minimal",
                pixel_ratio: 0.75,
                shadow_map_size: 0,
                max_lights: 1,
                static_shadows: false,
                dynamic_shadows: false,
                static_lod: 2,
                dynamic_lod: 2,
            },
        ])
    }
}

impl QualityLadder {
    /// Build a ladder. An empty list falls back to the default ladder.
    pub fn new(profiles: Vec<QualityProfile>) -> Self {
        if profiles.is_empty() {
            return Self::default();
        }
        Self { profiles }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Index of the lowest-fidelity profile
    pub fn lowest(&self) -> usize {
        self.profiles.len() - 1
    }

    /// Profile at `level`, clamped into the ladder
    pub fn get(&self, level: usize) -> &QualityProfile {
        &self.profiles[self.clamp(level)]
    }

    pub fn clamp(&self, level: usize) -> usize {
        level.min(self.lowest())
    }

    /// One level towards lower fidelity, if any
    pub fn step_down(&self, level: usize) -> Option<usize> {
        (level < self.lowest()).then_some(level + 1)
    }

    /// One level towards higher fidelity, if any
    pub fn step_up(&self, level: usize) -> Option<usize> {
        level.checked_sub(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QualityProfile> {
        self.profiles.iter()
    }
}
