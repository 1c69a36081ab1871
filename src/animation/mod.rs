//! Skeletal animation: clips and the playback state machine

pub mod clip;
pub mod state_machine;

pub use clip::{AnimationClip, BoneTrack, ClipLibrary, Keyframe, PlaybackMode};
pub use state_machine::{AdvanceOutcome, AnimationState, AnimationStateMachine};
