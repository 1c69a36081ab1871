//! Render loop: the backend seam and the per-frame driver

pub mod backend;
pub mod driver;

pub use backend::{
    BackendCapabilities, Camera, FrameInput, FrameRecord, FrameStats, HeadlessBackend,
    HeadlessHandle, RenderBackend, RenderTarget, Viewport,
};
pub use driver::{AvatarRenderer, FrameReport};
