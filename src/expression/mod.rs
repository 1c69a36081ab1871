//! Facial expression: emotion fades and audio-driven lip-sync

pub mod blender;
pub mod emotion;
pub mod lipsync;

pub use blender::ExpressionBlender;
pub use emotion::{BlendChannel, ChannelWeights, EmotionType};
pub use lipsync::{normalized_energy, viseme_weights, AudioAnalysisResult, BandEnergies};
