//! Render loop driver
//!
//! [`AvatarRenderer`] is the host-facing surface. Commands only record
//! intent; [`AvatarRenderer::tick`] runs the fixed per-frame pipeline:
//!
//! 1. apply finished loads and resolve emotion/audio inputs
//! 2. blender tick
//! 3. animation advance
//! 4. quality update from the previous frame's cost
//! 5. apply a pending resize, then render
//!
//! The tick never waits on the loader or the audio producer.

use crate::audio::SampleInbox;
use crate::config::{AvatarConfig, EngineConfig};
use crate::expression::{AudioAnalysisResult, ChannelWeights, EmotionType, ExpressionBlender};
use crate::animation::{AdvanceOutcome, AnimationStateMachine};
use crate::model::{AssetLoader, ModelStore, ResourceUsage, StoreEvent};
use crate::quality::{CostClass, FrameCost, ObjectHandle, QualityChange, QualityController};
use crate::render::backend::{Camera, FrameInput, RenderBackend, RenderTarget, Viewport};
use crate::state::{AvatarEvent, AvatarState, SharedAvatarState};
use crate::utils::channels::{AvatarChannels, EventHub};
use crate::utils::perf::{FrameMetrics, Stopwatch, TimingTracker};
use crate::{AvatarError, Result};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Summary of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Time since the previous tick (nominal on the first)
    pub dt: Duration,
    pub viewport: Viewport,
    pub quality_level: usize,
    pub quality_change: Option<QualityChange>,
    pub lip_sync_active: bool,
    pub metrics: FrameMetrics,
}

pub struct AvatarRenderer {
    config: EngineConfig,
    store: ModelStore,
    blender: ExpressionBlender,
    animation: AnimationStateMachine,
    quality: QualityController,
    backend: Box<dyn RenderBackend>,
    inbox: SampleInbox,

    viewport: Viewport,
    target: RenderTarget,
    camera: Camera,
    pending_viewport: Option<Viewport>,

    frame: u64,
    last_tick: Option<Duration>,
    last_cost: Option<FrameCost>,
    intervals: TimingTracker,
    metrics: FrameMetrics,

    avatar_objects: Vec<ObjectHandle>,
    error: Option<String>,
    state: Arc<AvatarState>,
    shared: SharedAvatarState,
    events: EventHub,
    disposed: bool,
}

impl AvatarRenderer {
    pub fn new(
        config: EngineConfig,
        loader: Arc<dyn AssetLoader>,
        mut backend: Box<dyn RenderBackend>,
        viewport: Viewport,
    ) -> Result<Self> {
        config.validate()?;
        let channels = AvatarChannels::new(&config);
        let store = ModelStore::new(loader, channels.loader)?;
        let quality = QualityController::new(config.quality.clone());

        let target = viewport.target(quality.profile().pixel_ratio);
        backend.resize(viewport, target);

        let state = Arc::new(AvatarState {
            quality_level: quality.level(),
            quality_profile: quality.profile().name.to_string(),
            ..AvatarState::default()
        });
        let shared = SharedAvatarState::new();
        shared.publish(Arc::clone(&state));

        info!(
            "Avatar renderer ready ({}x{}, quality {})",
            viewport.width,
            viewport.height,
            quality.profile().name
        );

        Ok(Self {
            blender: ExpressionBlender::new(config.blend.clone()),
            animation: AnimationStateMachine::new(),
            inbox: SampleInbox::new(config.audio.inbox_capacity),
            intervals: TimingTracker::new(config.quality.window_frames),
            config,
            store,
            quality,
            backend,
            viewport,
            target,
            camera: Camera::for_viewport(viewport),
            pending_viewport: None,
            frame: 0,
            last_tick: None,
            last_cost: None,
            metrics: FrameMetrics::default(),
            avatar_objects: Vec::new(),
            error: None,
            state,
            shared,
            events: channels.events,
            disposed: false,
        })
    }

    fn ensure_live(&self, operation: &'static str) -> Result<()> {
        if self.disposed {
            return Err(AvatarError::DisposedStateViolation(operation));
        }
        Ok(())
    }

    // === Commands ===

    /// Start loading a new avatar. The previous one keeps rendering until
    /// this load succeeds; a later `load` supersedes this one.
    pub fn load(&mut self, config: AvatarConfig) -> Result<Uuid> {
        self.ensure_live("load")?;
        self.store.load(config)
    }

    /// Abandon the load in flight; the current avatar keeps rendering
    pub fn cancel_load(&mut self) -> Result<()> {
        self.ensure_live("cancel_load")?;
        self.store.cancel()
    }

    pub fn set_emotion(&mut self, emotion: EmotionType) -> Result<()> {
        self.ensure_live("set_emotion")?;
        self.blender.set_emotion(emotion);
        Ok(())
    }

    pub fn update_lip_sync(&mut self, sample: AudioAnalysisResult) -> Result<()> {
        self.ensure_live("update_lip_sync")?;
        self.inbox.push(sample);
        Ok(())
    }

    /// Handle for pushing lip-sync samples from another thread
    pub fn lip_sync_sender(&self) -> Result<SampleInbox> {
        self.ensure_live("lip_sync_sender")?;
        Ok(self.inbox.clone())
    }

    /// Play a clip from the start, restarting it if it is already playing
    pub fn play_animation(&mut self, name: &str) -> Result<()> {
        self.ensure_live("play_animation")?;
        self.animation.play(name)
    }

    pub fn stop_animation(&mut self) -> Result<()> {
        self.ensure_live("stop_animation")?;
        self.animation.stop();
        Ok(())
    }

    /// Request new viewport dimensions, applied before the next render
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.ensure_live("resize")?;
        let viewport = Viewport::new(width, height)?;
        if viewport == self.viewport {
            self.pending_viewport = None;
        } else {
            debug!("Resize requested: {}x{}", width, height);
            self.pending_viewport = Some(viewport);
        }
        Ok(())
    }

    /// Register a host scene object for cost accounting
    pub fn track_object(&mut self, handle: ObjectHandle, class: CostClass) -> Result<bool> {
        self.ensure_live("track_object")?;
        Ok(self.quality.track_object(handle, class))
    }

    pub fn untrack_object(&mut self, handle: ObjectHandle) -> Result<bool> {
        self.ensure_live("untrack_object")?;
        Ok(self.quality.untrack_object(handle))
    }

    // === Render loop ===

    /// Run one frame. `now` is the host's monotonic frame clock; lip-sync
    /// sample timestamps must use the same clock.
    pub fn tick(&mut self, now: Duration) -> Result<FrameReport> {
        self.ensure_live("tick")?;
        self.frame += 1;

        let nominal = self.config.quality.frame_budget();
        let dt = match self.last_tick {
            Some(last) => {
                let dt = now.saturating_sub(last);
                self.intervals.record(dt);
                dt
            }
            None => nominal,
        };
        self.last_tick = Some(now);
        let frame_interval = if dt.is_zero() { nominal } else { dt };

        // 1. inputs
        for event in self.store.poll() {
            self.on_store_event(event);
        }
        if let Some(sample) = self.inbox.drain_latest() {
            self.blender.update_lip_sync(sample.clamped_to(now));
        }

        // 2. blender
        let weights = *self.blender.tick(now, dt, frame_interval);
        if let Some(model) = self.store.model_mut() {
            model.apply_expression(&weights);
        }

        // 3. animation
        if let AdvanceOutcome::Finished(clip) = self.animation.advance(dt.as_secs_f32()) {
            debug!("Animation {} finished", clip);
            self.events.emit(AvatarEvent::AnimationFinished(clip));
        }
        if let Some(model) = self.store.model_mut() {
            model.set_pose(self.animation.pose());
        }

        // 4. quality
        let previous_ratio = self.quality.profile().pixel_ratio;
        let mut quality_change = None;
        if let Some(cost) = self.last_cost.take() {
            let update = self.quality.update(&cost);
            if let Some(warning) = update.warning {
                self.events.emit(AvatarEvent::CapabilityWarning(warning));
            }
            if let Some(change) = update.change {
                self.events.emit(AvatarEvent::QualityChanged {
                    from: change.from,
                    to: change.to,
                    profile: self.quality.profile().name,
                });
                quality_change = Some(change);
            }
        }

        // 5. resize, then render
        let pixel_ratio = self.quality.profile().pixel_ratio;
        let pending = self.pending_viewport.take();
        if pending.is_some() || pixel_ratio != previous_ratio {
            self.apply_viewport(pending.unwrap_or(self.viewport), pixel_ratio);
        }
        self.render();

        self.publish_state();

        Ok(FrameReport {
            frame: self.frame,
            dt,
            viewport: self.viewport,
            quality_level: self.quality.level(),
            quality_change,
            lip_sync_active: self.blender.lip_sync_active(),
            metrics: self.metrics.clone(),
        })
    }

    fn on_store_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Loaded { config_id, .. } => {
                for handle in self.avatar_objects.drain(..) {
                    self.quality.untrack_object(handle);
                }
                if let Some(model) = self.store.model() {
                    self.avatar_objects = model.object_handles();
                    self.animation
                        .set_library(model.clips().clone(), model.scene().rest_pose());
                }
                for handle in &self.avatar_objects {
                    self.quality.track_object(*handle, CostClass::Detailed);
                }
                match self.store.live_config() {
                    Some(config) => self.blender.set_customization(&config.customization),
                    None => self.blender.clear_customization(),
                }
                self.error = None;
                self.events.emit(AvatarEvent::Loaded { config_id });
            }
            StoreEvent::Failed { config_id, error } => {
                self.error = Some(error.to_string());
                self.events.emit(AvatarEvent::Error { config_id, error });
            }
        }
    }

    fn apply_viewport(&mut self, viewport: Viewport, pixel_ratio: f32) {
        self.viewport = viewport;
        self.target = viewport.target(pixel_ratio);
        self.camera = Camera::for_viewport(viewport);
        self.backend.resize(self.viewport, self.target);
        debug!(
            "Viewport {}x{} (target {}x{})",
            viewport.width, viewport.height, self.target.width, self.target.height
        );
    }

    fn render(&mut self) {
        let timing = self.backend.capabilities().frame_timing;
        let blend_weights: &[f32] = self
            .store
            .model()
            .map(|m| m.blend_weights())
            .unwrap_or(&[]);
        let input = FrameInput {
            frame: self.frame,
            viewport: self.viewport,
            target: self.target,
            camera: self.camera,
            scene: self.store.root(),
            blend_weights,
            profile: self.quality.profile(),
            objects: self.quality.registry(),
        };

        let stopwatch = Stopwatch::start();
        let stats = self.backend.render(&input);
        let elapsed = stopwatch.elapsed();

        let render_time = timing.then(|| stats.gpu_time.unwrap_or(elapsed));
        trace!("Frame {} rendered in {:?}", self.frame, render_time);

        self.last_cost = Some(FrameCost {
            render_time,
            draw_calls: stats.draw_calls,
            triangles: stats.triangles,
        });
        self.metrics = FrameMetrics {
            render_ms: render_time.map(|t| t.as_secs_f32() * 1000.0),
            draw_calls: stats.draw_calls,
            triangles: stats.triangles,
            quality_level: self.quality.level(),
            ..FrameMetrics::from_intervals(&self.intervals)
        };
    }

    fn publish_state(&mut self) {
        let profile = self.quality.profile();
        let next = AvatarState {
            is_loaded: self.store.is_loaded(),
            is_loading: self.store.is_loading(),
            is_animating: self.animation.is_playing(),
            current_emotion: self.blender.current_emotion(),
            current_animation: self.animation.current_animation().map(str::to_string),
            lip_sync_active: self.blender.lip_sync_active(),
            error: self.error.clone(),
            quality_level: self.quality.level(),
            quality_profile: profile.name.to_string(),
        };
        let changed = next != *self.state;
        if changed {
            self.state = Arc::new(next);
            self.shared.publish(Arc::clone(&self.state));
        }
        self.events.publish_state(&self.state, changed);
    }

    // === Queries ===

    /// Snapshot produced by the last tick
    pub fn state(&self) -> Result<Arc<AvatarState>> {
        self.ensure_live("state")?;
        Ok(Arc::clone(&self.state))
    }

    /// Handle that always yields the latest snapshot
    pub fn shared_state(&self) -> Result<SharedAvatarState> {
        self.ensure_live("shared_state")?;
        Ok(self.shared.clone())
    }

    /// Open a receiver for [`AvatarEvent`]s. Every subscriber sees every
    /// event; a subscriber that falls behind only misses older snapshots.
    pub fn subscribe(&mut self) -> Result<Receiver<AvatarEvent>> {
        self.ensure_live("subscribe")?;
        Ok(self.events.subscribe())
    }

    /// Blend weights computed by the last tick
    pub fn blend_weights(&self) -> Result<ChannelWeights> {
        self.ensure_live("blend_weights")?;
        Ok(*self.blender.output())
    }

    pub fn clip_names(&self) -> Result<Vec<String>> {
        self.ensure_live("clip_names")?;
        Ok(self.animation.library().names())
    }

    pub fn clip_time(&self) -> Result<Option<f32>> {
        self.ensure_live("clip_time")?;
        Ok(self.animation.clip_time())
    }

    pub fn metrics(&self) -> Result<FrameMetrics> {
        self.ensure_live("metrics")?;
        Ok(self.metrics.clone())
    }

    pub fn resource_usage(&self) -> Result<ResourceUsage> {
        self.ensure_live("resource_usage")?;
        Ok(self.store.resource_usage())
    }

    pub fn viewport(&self) -> Result<Viewport> {
        self.ensure_live("viewport")?;
        Ok(self.viewport)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // === Teardown ===

    /// Cancel any load and release everything. Safe to call repeatedly;
    /// every other method fails afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.store.dispose();
        self.animation.clear();
        self.avatar_objects.clear();
        self.quality.clear_objects();
        self.inbox.clear();
        self.blender.clear_customization();
        self.pending_viewport = None;
        self.last_cost = None;
        self.events.clear();
        self.backend.release();

        info!("Avatar renderer disposed after {} frames", self.frame);
    }
}

impl Drop for AvatarRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InMemoryLoader, ModelManifest};
    use crate::render::backend::{HeadlessBackend, HeadlessHandle};
    use std::time::Instant;

    const FRAME: Duration = Duration::from_millis(16);

    struct Rig {
        renderer: AvatarRenderer,
        handle: HeadlessHandle,
        now: Duration,
    }

    impl Rig {
        fn new() -> Self {
            let loader = InMemoryLoader::new();
            loader.insert("mem://ava", ModelManifest::demo());
            let backend = HeadlessBackend::new();
            let handle = backend.handle();
            let renderer = AvatarRenderer::new(
                EngineConfig::default(),
                Arc::new(loader),
                Box::new(backend),
                Viewport::new(640, 480).unwrap(),
            )
            .unwrap();
            Self {
                renderer,
                handle,
                now: Duration::ZERO,
            }
        }

        fn tick(&mut self) -> FrameReport {
            self.now += FRAME;
            self.renderer.tick(self.now).unwrap()
        }

        fn tick_until_loaded(&mut self) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !self.renderer.state().unwrap().is_loaded {
                assert!(Instant::now() < deadline, "avatar never loaded");
                std::thread::sleep(Duration::from_millis(2));
                self.tick();
            }
        }
    }

    #[test]
    fn test_tick_without_model_renders() {
        let mut rig = Rig::new();
        let report = rig.tick();
        assert_eq!(report.frame, 1);
        assert_eq!(report.dt, EngineConfig::default().quality.frame_budget());
        assert!(!rig.handle.last_frame().unwrap().has_scene);
    }

    #[test]
    fn test_load_then_animate() {
        let mut rig = Rig::new();
        rig.renderer
            .load(AvatarConfig::new("ava", "Ava", "mem://ava"))
            .unwrap();
        rig.tick_until_loaded();

        assert!(rig.handle.last_frame().unwrap().has_scene);
        rig.renderer.play_animation("talking").unwrap();
        rig.tick();
        let state = rig.renderer.state().unwrap();
        assert!(state.is_animating);
        assert_eq!(state.current_animation.as_deref(), Some("talking"));
    }

    #[test]
    fn test_play_without_model_fails() {
        let mut rig = Rig::new();
        assert_eq!(
            rig.renderer.play_animation("idle"),
            Err(AvatarError::AnimationNotFound("idle".to_string()))
        );
    }

    #[test]
    fn test_resize_applied_on_next_tick() {
        let mut rig = Rig::new();
        rig.tick();
        rig.renderer.resize(1000, 500).unwrap();
        assert_eq!(rig.renderer.viewport().unwrap(), Viewport::new(640, 480).unwrap());

        rig.tick();
        let frame = rig.handle.last_frame().unwrap();
        assert_eq!(frame.surface, Viewport::new(1000, 500).unwrap());
        assert_eq!(frame.camera_aspect, 2.0);
        assert!(matches!(
            rig.renderer.resize(0, 10),
            Err(AvatarError::InvalidViewport { .. })
        ));
    }

    #[test]
    fn test_state_changed_only_on_change() {
        let mut rig = Rig::new();
        let events = rig.renderer.subscribe().unwrap();
        rig.tick();
        rig.tick();
        assert!(events.try_iter().all(|e| !matches!(e, AvatarEvent::StateChanged(_))));

        rig.renderer.set_emotion(EmotionType::Happy).unwrap();
        rig.tick();
        let changed: Vec<_> = events
            .try_iter()
            .filter(|e| matches!(e, AvatarEvent::StateChanged(_)))
            .collect();
        assert_eq!(changed.len(), 1);
    }

    #[test]
    fn test_unbounded_quality_config_rejected() {
        let mut config = EngineConfig::default();
        config.quality.degrade_ratio = f32::INFINITY;
        let created = AvatarRenderer::new(
            config,
            Arc::new(InMemoryLoader::new()),
            Box::new(HeadlessBackend::new()),
            Viewport::new(640, 480).unwrap(),
        );
        assert!(matches!(created, Err(AvatarError::ConfigError(_))));
    }

    #[test]
    fn test_every_subscriber_gets_state_changes() {
        let mut rig = Rig::new();
        let first = rig.renderer.subscribe().unwrap();
        let second = rig.renderer.subscribe().unwrap();

        rig.renderer.set_emotion(EmotionType::Sad).unwrap();
        rig.tick();

        for events in [&first, &second] {
            let changed = events
                .try_iter()
                .filter(|e| matches!(e, AvatarEvent::StateChanged(_)))
                .count();
            assert_eq!(changed, 1);
        }
    }

    #[test]
    fn test_dispose_is_terminal() {
        let mut rig = Rig::new();
        rig.tick();
        rig.renderer.dispose();
        rig.renderer.dispose();

        assert!(rig.handle.is_released());
        assert_eq!(
            rig.renderer.tick(Duration::from_secs(1)),
            Err(AvatarError::DisposedStateViolation("tick"))
        );
        assert!(rig.renderer.state().is_err());
    }
}
