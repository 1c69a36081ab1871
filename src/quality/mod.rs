//! Adaptive quality: profile ladder, tracked-object registry and the
//! frame-cost controller

pub mod controller;
pub mod profile;
pub mod registry;

pub use controller::{FrameCost, QualityChange, QualityController, QualityUpdate};
pub use profile::{QualityLadder, QualityProfile};
pub use registry::{CostClass, ObjectHandle, ObjectRegistry, ObjectRenderSettings, TrackedObject};
