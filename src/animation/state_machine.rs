//! Animation state machine
//!
//! Purely state: time only moves when the render loop calls [`advance`].
//!
//! [`advance`]: AnimationStateMachine::advance

use crate::animation::clip::{ClipLibrary, PlaybackMode};
use crate::model::asset::Pose;
use crate::{AvatarError, Result};
use tracing::debug;

/// Current playback state
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationState {
    Idle,
    Playing {
        clip: String,
        /// Seconds into the clip
        time: f32,
    },
}

/// Outcome of one [`AnimationStateMachine::advance`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Idle,
    Playing,
    /// A one-shot clip reached its end; the machine is back in `Idle`
    Finished(String),
}

#[derive(Debug)]
pub struct AnimationStateMachine {
    state: AnimationState,
    library: ClipLibrary,
    pose: Pose,
}

impl Default for AnimationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationStateMachine {
    pub fn new() -> Self {
        Self {
            state: AnimationState::Idle,
            library: ClipLibrary::new(),
            pose: Pose::default(),
        }
    }

    /// Swap in a new model's clips and rest pose
    ///
    /// Playback carries over if the new library has the same clip.
    pub fn set_library(&mut self, library: ClipLibrary, rest_pose: Pose) {
        if let AnimationState::Playing { clip, .. } = &self.state {
            if !library.contains(clip) {
                debug!("Clip {} not in new library, returning to idle", clip);
                self.state = AnimationState::Idle;
            }
        }
        self.library = library;
        self.pose = rest_pose;
    }

    /// Drop all clips and return to `Idle`
    pub fn clear(&mut self) {
        self.state = AnimationState::Idle;
        self.library = ClipLibrary::new();
        self.pose = Pose::default();
    }

    /// Start `name` from time zero, even if it is already playing
    ///
    /// Unknown names leave the state untouched.
    pub fn play(&mut self, name: &str) -> Result<()> {
        if !self.library.contains(name) {
            return Err(AvatarError::AnimationNotFound(name.to_string()));
        }
        debug!("Playing animation {}", name);
        self.state = AnimationState::Playing {
            clip: name.to_string(),
            time: 0.0,
        };
        Ok(())
    }

    /// Return to `Idle`, holding the current pose
    pub fn stop(&mut self) {
        if let AnimationState::Playing { clip, .. } = &self.state {
            debug!("Stopping animation {}", clip);
        }
        self.state = AnimationState::Idle;
    }

    /// Move the clip clock forward by `dt` seconds and resample the pose
    pub fn advance(&mut self, dt: f32) -> AdvanceOutcome {
        let AnimationState::Playing { clip, time } = &mut self.state else {
            return AdvanceOutcome::Idle;
        };
        let Some(current) = self.library.get(clip) else {
            self.state = AnimationState::Idle;
            return AdvanceOutcome::Idle;
        };

        *time += dt.max(0.0);
        match current.mode {
            PlaybackMode::Loop => {
                if current.duration > 0.0 {
                    *time %= current.duration;
                } else {
                    *time = 0.0;
                }
                current.sample_into(*time, &mut self.pose);
                AdvanceOutcome::Playing
            }
            PlaybackMode::Once => {
                if *time >= current.duration {
                    current.sample_into(current.duration, &mut self.pose);
                    let finished = current.name.clone();
                    self.state = AnimationState::Idle;
                    AdvanceOutcome::Finished(finished)
                } else {
                    current.sample_into(*time, &mut self.pose);
                    AdvanceOutcome::Playing
                }
            }
        }
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn current_animation(&self) -> Option<&str> {
        match &self.state {
            AnimationState::Playing { clip, .. } => Some(clip),
            AnimationState::Idle => None,
        }
    }

    pub fn clip_time(&self) -> Option<f32> {
        match &self.state {
            AnimationState::Playing { time, .. } => Some(*time),
            AnimationState::Idle => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, AnimationState::Playing { .. })
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn library(&self) -> &ClipLibrary {
        &self.library
    }
}
