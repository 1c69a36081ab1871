//! Registry of scene objects the quality controller accounts for
//!
//! The registry never owns the objects. It maps handles to a cost class and
//! remembers the settings last pushed for each one.

use crate::quality::profile::QualityProfile;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque handle of a renderable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// Allocate a process-unique handle
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Cost classification of a tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostClass {
    /// Static scenery; degraded first
    Background,
    /// The avatar and other focal objects; degraded last
    Detailed,
}

/// Settings the controller applies to one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRenderSettings {
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub lod: u8,
}

impl ObjectRenderSettings {
    pub fn for_profile(class: CostClass, profile: &QualityProfile) -> Self {
        let (shadows, lod) = match class {
            CostClass::Background => (profile.static_shadows, profile.static_lod),
            CostClass::Detailed => (profile.dynamic_shadows, profile.dynamic_lod),
        };
        Self {
            cast_shadow: shadows,
            receive_shadow: shadows,
            lod,
        }
    }
}

/// A registered object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedObject {
    pub handle: ObjectHandle,
    pub class: CostClass,
    pub settings: ObjectRenderSettings,
}

#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: HashMap<ObjectHandle, TrackedObject>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle`. Returns false if it was already tracked; the
    /// existing classification is kept.
    pub fn track(&mut self, handle: ObjectHandle, class: CostClass, profile: &QualityProfile) -> bool {
        if self.objects.contains_key(&handle) {
            return false;
        }
        self.objects.insert(
            handle,
            TrackedObject {
                handle,
                class,
                settings: ObjectRenderSettings::for_profile(class, profile),
            },
        );
        true
    }

    pub fn untrack(&mut self, handle: ObjectHandle) -> bool {
        self.objects.remove(&handle).is_some()
    }

    /// Push a profile's settings to every object
    pub fn apply_profile(&mut self, profile: &QualityProfile) {
        for object in self.objects.values_mut() {
            object.settings = ObjectRenderSettings::for_profile(object.class, profile);
        }
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&TrackedObject> {
        self.objects.get(&handle)
    }

    pub fn settings(&self, handle: ObjectHandle) -> Option<ObjectRenderSettings> {
        self.objects.get(&handle).map(|o| o.settings)
    }

    pub fn count(&self, class: CostClass) -> usize {
        self.objects.values().filter(|o| o.class == class).count()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::profile::QualityLadder;

    #[test]
    fn test_handles_unique() {
        assert_ne!(ObjectHandle::next(), ObjectHandle::next());
    }

    #[test]
    fn test_track_is_idempotent() {
        let ladder = QualityLadder::default();
        let mut registry = ObjectRegistry::new();
        let handle = ObjectHandle::next();

        assert!(registry.track(handle, CostClass::Detailed, ladder.get(0)));
        assert!(!registry.track(handle, CostClass::Background, ladder.get(0)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(handle).unwrap().class, CostClass::Detailed);
    }

    #[test]
    fn test_apply_profile_degrades_background_first() {
        let ladder = QualityLadder::default();
        let mut registry = ObjectRegistry::new();
        let floor = ObjectHandle::next();
        let avatar = ObjectHandle::next();
        registry.track(floor, CostClass::Background, ladder.get(0));
        registry.track(avatar, CostClass::Detailed, ladder.get(0));

        registry.apply_profile(ladder.get(2));
        assert!(!registry.settings(floor).unwrap().cast_shadow);
        assert!(registry.settings(avatar).unwrap().cast_shadow);

        registry.apply_profile(ladder.get(ladder.lowest()));
        assert!(!registry.settings(avatar).unwrap().cast_shadow);
    }

    #[test]
    fn test_untrack() {
        let ladder = QualityLadder::default();
        let mut registry = ObjectRegistry::new();
        let handle = ObjectHandle::next();
        registry.track(handle, CostClass::Background, ladder.get(0));

        assert!(registry.untrack(handle));
        assert!(!registry.untrack(handle));
        assert!(registry.is_empty());
    }
}
