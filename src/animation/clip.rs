//! Animation clips and keyframe sampling

use crate::model::asset::{Pose, Rotation};
use std::collections::HashMap;

/// Clips that loop unless a manifest says otherwise
pub const LOOPING_CLIPS: &[&str] = &["idle", "talking", "thinking"];

/// How a clip behaves when it reaches its end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Loop,
    /// Hold the final pose and finish
    Once,
}

impl PlaybackMode {
    /// Default mode for a clip name
    pub fn default_for(name: &str) -> Self {
        if LOOPING_CLIPS.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            PlaybackMode::Loop
        } else {
            PlaybackMode::Once
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    /// Seconds from clip start
    pub time: f32,
    pub rotation: Rotation,
}

/// Keyframes for one bone, sorted by time
#[derive(Debug, Clone, PartialEq)]
pub struct BoneTrack {
    pub bone: usize,
    keys: Vec<Keyframe>,
}

impl BoneTrack {
    pub fn new(bone: usize, mut keys: Vec<Keyframe>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { bone, keys }
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// Rotation at `time`, holding the first/last key outside the keyed range
    pub fn sample(&self, time: f32) -> Option<Rotation> {
        let first = self.keys.first()?;
        let last = self.keys.last()?;
        if time <= first.time {
            return Some(first.rotation);
        }
        if time >= last.time {
            return Some(last.rotation);
        }

        let next = self.keys.partition_point(|k| k.time <= time);
        let a = &self.keys[next - 1];
        let b = &self.keys[next];
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return Some(b.rotation);
        }
        Some(a.rotation.slerp(&b.rotation, (time - a.time) / span))
    }
}

/// A named animation
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    /// Length in seconds
    pub duration: f32,
    pub mode: PlaybackMode,
    pub tracks: Vec<BoneTrack>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, duration: f32, tracks: Vec<BoneTrack>) -> Self {
        let name = name.into();
        let mode = PlaybackMode::default_for(&name);
        Self {
            name,
            duration: duration.max(0.0),
            mode,
            tracks,
        }
    }

    pub fn with_mode(mut self, mode: PlaybackMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_looping(&self) -> bool {
        self.mode == PlaybackMode::Loop
    }

    /// Write the clip's rotations at `time` into `pose`. Unanimated bones are left alone.
    pub fn sample_into(&self, time: f32, pose: &mut Pose) {
        for track in &self.tracks {
            if let Some(rotation) = track.sample(time) {
                pose.set(track.bone, rotation);
            }
        }
    }
}

/// Clips of one model, by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipLibrary {
    clips: HashMap<String, AnimationClip>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, clip: AnimationClip) {
        self.clips.insert(clip.name.clone(), clip);
    }

    pub fn get(&self, name: &str) -> Option<&AnimationClip> {
        self.clips.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    /// Clip names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clips.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

impl FromIterator<AnimationClip> for ClipLibrary {
    fn from_iter<I: IntoIterator<Item = AnimationClip>>(iter: I) -> Self {
        let mut library = ClipLibrary::new();
        for clip in iter {
            library.insert(clip);
        }
        library
    }
}
