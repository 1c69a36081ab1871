//! Host-visible avatar state
//!
//! The renderer produces one immutable [`AvatarState`] snapshot per tick.
//! Hosts either read the latest one through [`SharedAvatarState`] or react to
//! [`AvatarEvent`]s from a subscription.

use crate::error::{AssetError, CapabilityWarning};
use crate::expression::EmotionType;
use parking_lot::RwLock;
use std::sync::Arc;

/// Snapshot of the avatar as of the last render tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AvatarState {
    pub is_loaded: bool,
    pub is_loading: bool,
    pub is_animating: bool,
    pub current_emotion: EmotionType,
    pub current_animation: Option<String>,
    pub lip_sync_active: bool,
    /// Message of the last load failure, cleared by the next successful load
    pub error: Option<String>,
    /// Active quality ladder index (0 = highest fidelity)
    pub quality_level: usize,
    pub quality_profile: String,
}

impl AvatarState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Short status line for UIs
    pub fn status_text(&self) -> String {
        if self.is_loading && !self.is_loaded {
            return "Loading avatar...".to_string();
        }
        if let Some(error) = &self.error {
            return format!("Error: {}", error);
        }
        if !self.is_loaded {
            return "No avatar".to_string();
        }
        match &self.current_animation {
            Some(clip) => format!("{} ({})", self.current_emotion, clip),
            None => self.current_emotion.to_string(),
        }
    }
}

/// Thread-safe handle to the latest snapshot
///
/// Readers get an `Arc` and never hold the lock past the call.
#[derive(Clone, Debug)]
pub struct SharedAvatarState {
    inner: Arc<RwLock<Arc<AvatarState>>>,
}

impl Default for SharedAvatarState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedAvatarState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(AvatarState::new()))),
        }
    }

    /// Get the latest snapshot
    pub fn snapshot(&self) -> Arc<AvatarState> {
        Arc::clone(&self.inner.read())
    }

    /// Publish a new snapshot
    pub fn publish(&self, state: Arc<AvatarState>) {
        *self.inner.write() = state;
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.read().is_loaded
    }

    pub fn quality_level(&self) -> usize {
        self.inner.read().quality_level
    }
}

/// Notifications from the renderer to the host
#[derive(Clone, Debug, PartialEq)]
pub enum AvatarEvent {
    /// A load completed; fired once per successful load
    Loaded { config_id: String },

    /// A load failed; the previous model (if any) keeps rendering
    Error { config_id: String, error: AssetError },

    /// The snapshot differs from the previous tick's
    StateChanged(Arc<AvatarState>),

    /// The quality controller moved one level
    QualityChanged {
        from: usize,
        to: usize,
        profile: &'static str,
    },

    /// A capability is missing and the core degraded gracefully
    CapabilityWarning(CapabilityWarning),

    /// A one-shot clip reached its end
    AnimationFinished(String),
}
