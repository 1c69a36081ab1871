//! Render backend seam
//!
//! The driver issues exactly one [`RenderBackend::render`] per tick. The
//! backend owns the drawable surface; everything it needs for the frame is
//! in [`FrameInput`].

use crate::model::SceneGraph;
use crate::quality::{ObjectRegistry, QualityProfile};
use crate::{AvatarError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Logical size of the drawable area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Reject zero-sized viewports
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(AvatarError::InvalidViewport { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Physical render-target size at `pixel_ratio`, at least 1x1
    pub fn target(&self, pixel_ratio: f32) -> RenderTarget {
        let scale = |v: u32| ((v as f32 * pixel_ratio).round() as u32).max(1);
        RenderTarget {
            width: scale(self.width),
            height: scale(self.height),
        }
    }
}

/// Physical size of the render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
}

/// Perspective camera framing the avatar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn for_viewport(viewport: Viewport) -> Self {
        Self {
            fov_y_deg: 30.0,
            aspect: viewport.aspect(),
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Everything a backend needs to draw one frame
pub struct FrameInput<'a> {
    pub frame: u64,
    pub viewport: Viewport,
    pub target: RenderTarget,
    pub camera: Camera,
    pub scene: Option<&'a SceneGraph>,
    pub blend_weights: &'a [f32],
    pub profile: &'a QualityProfile,
    pub objects: &'a ObjectRegistry,
}

/// What the backend reports after a frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub triangles: u64,
    /// Backend-measured frame cost, when it has one
    pub gpu_time: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Whether frame cost can be measured at all
    pub frame_timing: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self { frame_timing: true }
    }
}

pub trait RenderBackend: Send {
    fn capabilities(&self) -> BackendCapabilities;

    /// Apply new surface dimensions. Called before the render that uses them.
    fn resize(&mut self, viewport: Viewport, target: RenderTarget);

    fn render(&mut self, frame: &FrameInput<'_>) -> FrameStats;

    /// Free surface resources. No further calls follow.
    fn release(&mut self);
}

const MAX_RECORDED_FRAMES: usize = 1024;

/// One frame as seen by [`HeadlessBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub frame: u64,
    /// Viewport the backend was last resized to
    pub surface: Viewport,
    pub target: RenderTarget,
    pub camera_aspect: f32,
    pub profile: &'static str,
    pub has_scene: bool,
    pub blend_weights: Vec<f32>,
}

#[derive(Debug, Default)]
struct HeadlessLog {
    frames: VecDeque<FrameRecord>,
    frames_rendered: u64,
    resizes: usize,
    released: bool,
    simulated_cost: Option<Duration>,
}

/// Inspection and control handle for a [`HeadlessBackend`]
#[derive(Debug, Clone)]
pub struct HeadlessHandle {
    log: Arc<Mutex<HeadlessLog>>,
}

impl HeadlessHandle {
    /// Report `cost` as the GPU time of every following frame
    pub fn set_frame_cost(&self, cost: Option<Duration>) {
        self.log.lock().simulated_cost = cost;
    }

    pub fn last_frame(&self) -> Option<FrameRecord> {
        self.log.lock().frames.back().cloned()
    }

    /// Most recent frames, oldest first
    pub fn frames(&self) -> Vec<FrameRecord> {
        self.log.lock().frames.iter().cloned().collect()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.log.lock().frames_rendered
    }

    pub fn resize_count(&self) -> usize {
        self.log.lock().resizes
    }

    pub fn is_released(&self) -> bool {
        self.log.lock().released
    }
}

/// Backend that draws nothing and records every frame
///
/// Used by tests and by the viewer, which paints the recorded state with egui.
pub struct HeadlessBackend {
    log: Arc<Mutex<HeadlessLog>>,
    capabilities: BackendCapabilities,
    surface: Option<Viewport>,
    target: Option<RenderTarget>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(HeadlessLog::default())),
            capabilities: BackendCapabilities::default(),
            surface: None,
            target: None,
        }
    }

    /// Simulate a platform without frame timing
    pub fn without_frame_timing(mut self) -> Self {
        self.capabilities.frame_timing = false;
        self
    }

    pub fn handle(&self) -> HeadlessHandle {
        HeadlessHandle {
            log: Arc::clone(&self.log),
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn resize(&mut self, viewport: Viewport, target: RenderTarget) {
        self.surface = Some(viewport);
        self.target = Some(target);
        self.log.lock().resizes += 1;
    }

    fn render(&mut self, frame: &FrameInput<'_>) -> FrameStats {
        let mut log = self.log.lock();

        let (draw_calls, triangles) = match frame.scene {
            Some(scene) => (scene.meshes.len() as u32, scene.triangle_count()),
            None => (0, 0),
        };

        let record = FrameRecord {
            frame: frame.frame,
            surface: self.surface.unwrap_or(frame.viewport),
            target: self.target.unwrap_or(frame.target),
            camera_aspect: frame.camera.aspect,
            profile: frame.profile.name,
            has_scene: frame.scene.is_some(),
            blend_weights: frame.blend_weights.to_vec(),
        };
        if log.frames.len() >= MAX_RECORDED_FRAMES {
            log.frames.pop_front();
        }
        log.frames.push_back(record);
        log.frames_rendered += 1;

        FrameStats {
            draw_calls,
            triangles,
            gpu_time: if self.capabilities.frame_timing {
                log.simulated_cost
            } else {
                None
            },
        }
    }

    fn release(&mut self) {
        self.surface = None;
        self.target = None;
        self.log.lock().released = true;
    }
}
