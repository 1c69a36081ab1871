//! Babble Avatar - real-time avatar rendering core
//!
//! Loads rigged avatar models, blends emotion and lip-sync expressions,
//! plays skeletal clips and keeps frame cost inside budget by stepping
//! through a quality ladder. [`AvatarRenderer`] drives all of it, one tick
//! per display frame.

pub mod animation;
pub mod audio;
pub mod config;
pub mod error;
pub mod expression;
pub mod model;
pub mod quality;
pub mod render;
pub mod state;
#[cfg(feature = "viewer")]
pub mod ui;
pub mod utils;

// Re-export error types
pub use error::{AssetError, AvatarError, CapabilityWarning, Result};

pub use config::{AvatarConfig, EngineConfig};
pub use expression::{AudioAnalysisResult, EmotionType};
pub use model::{AssetLoader, InMemoryLoader, ManifestFileLoader, ModelManifest};
pub use quality::{CostClass, ObjectHandle};
pub use render::{AvatarRenderer, HeadlessBackend, RenderBackend, Viewport};
pub use state::{AvatarEvent, AvatarState, SharedAvatarState};
