//! End-to-end tests driving `AvatarRenderer` through the headless backend

use babble_avatar::config::QualityConfig;
use babble_avatar::expression::BlendChannel;
use babble_avatar::model::ModelManifest;
use babble_avatar::quality::QualityLadder;
use babble_avatar::render::{FrameReport, HeadlessHandle};
use babble_avatar::{
    AssetError, AudioAnalysisResult, AvatarConfig, AvatarError, AvatarEvent, AvatarRenderer,
    CapabilityWarning, EmotionType, EngineConfig, HeadlessBackend, InMemoryLoader, Viewport,
};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(16);
const TIMEOUT: Duration = Duration::from_secs(5);

struct TestHost {
    renderer: AvatarRenderer,
    backend: HeadlessHandle,
    loader: InMemoryLoader,
    events: Receiver<AvatarEvent>,
    now: Duration,
}

impl TestHost {
    fn new() -> Self {
        Self::with(EngineConfig::default(), HeadlessBackend::new())
    }

    fn with(config: EngineConfig, backend: HeadlessBackend) -> Self {
        let loader = InMemoryLoader::new();
        loader.insert("mem://ava", ModelManifest::demo());

        let handle = backend.handle();
        let mut renderer = AvatarRenderer::new(
            config,
            Arc::new(loader.clone()),
            Box::new(backend),
            Viewport::new(800, 600).unwrap(),
        )
        .unwrap();
        let events = renderer.subscribe().unwrap();

        Self {
            renderer,
            backend: handle,
            loader,
            events,
            now: Duration::ZERO,
        }
    }

    fn tick(&mut self) -> FrameReport {
        self.now += FRAME;
        self.renderer.tick(self.now).unwrap()
    }

    fn ticks(&mut self, n: usize) -> Vec<FrameReport> {
        (0..n).map(|_| self.tick()).collect()
    }

    /// Tick with real sleeps until `done` holds
    fn tick_until(&mut self, mut done: impl FnMut(&mut Self) -> bool) {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            self.tick();
            if done(self) {
                return;
            }
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn load_and_wait(&mut self, config: AvatarConfig) {
        self.renderer.load(config).unwrap();
        self.tick_until(|host| host.renderer.state().unwrap().is_loaded);
    }

    fn drain_events(&self) -> Vec<AvatarEvent> {
        self.events.try_iter().collect()
    }
}

fn ava() -> AvatarConfig {
    AvatarConfig::new("ava", "Ava", "mem://ava")
}

/// Demo manifest without the body mesh, so its resource usage differs
fn head_only() -> ModelManifest {
    let mut manifest = ModelManifest::demo();
    manifest.meshes.retain(|m| m.name == "head");
    manifest
}

#[test]
fn test_last_load_wins_without_leaks() {
    // Baseline: a clean single load of B
    let mut clean = TestHost::new();
    clean.loader.insert("mem://b", head_only());
    clean.load_and_wait(AvatarConfig::new("b", "B", "mem://b"));
    let baseline = clean.renderer.resource_usage().unwrap();
    assert!(!baseline.is_empty());

    let mut host = TestHost::new();
    host.loader
        .insert_delayed("mem://a", ModelManifest::demo(), Duration::from_millis(150));
    host.loader.insert("mem://b", head_only());

    host.renderer.load(AvatarConfig::new("a", "A", "mem://a")).unwrap();
    host.renderer.load(AvatarConfig::new("b", "B", "mem://b")).unwrap();
    host.tick_until(|h| h.renderer.state().unwrap().is_loaded);

    // Give A's delay time to run out
    std::thread::sleep(Duration::from_millis(250));
    host.tick_until(|h| h.renderer.resource_usage().unwrap() == baseline);
    host.ticks(5);

    let loaded: Vec<String> = host
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            AvatarEvent::Loaded { config_id } => Some(config_id),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, vec!["b".to_string()]);
    assert_eq!(host.renderer.resource_usage().unwrap(), baseline);
    assert_eq!(host.backend.last_frame().unwrap().blend_weights.len(), BlendChannel::COUNT);
}

#[test]
fn test_failed_load_keeps_previous_avatar() {
    let mut host = TestHost::new();
    host.load_and_wait(ava());
    let usage = host.renderer.resource_usage().unwrap();

    host.loader.insert_failure(
        "mem://broken",
        AssetError::Malformed("truncated manifest".to_string()),
        Duration::ZERO,
    );
    host.renderer
        .load(AvatarConfig::new("broken", "Broken", "mem://broken"))
        .unwrap();
    host.tick_until(|h| h.renderer.state().unwrap().has_error());

    let state = host.renderer.state().unwrap();
    assert!(state.is_loaded);
    assert!(state.error.as_deref().unwrap().contains("truncated manifest"));
    assert_eq!(host.renderer.resource_usage().unwrap(), usage);
    assert!(host.backend.last_frame().unwrap().has_scene);

    let errors = host
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, AvatarEvent::Error { config_id, .. } if config_id == "broken"))
        .count();
    assert_eq!(errors, 1);

    // A successful load clears the error
    host.renderer.load(ava()).unwrap();
    host.tick_until(|h| !h.renderer.state().unwrap().has_error());
    assert!(host.renderer.state().unwrap().is_loaded);
}

#[test]
fn test_interrupted_emotion_settles_on_latest_target() {
    let mut host = TestHost::new();
    host.renderer.set_emotion(EmotionType::Happy).unwrap();
    host.ticks(3);
    host.renderer.set_emotion(EmotionType::Sad).unwrap();

    // 30 frames is well past the smoothing window
    for _ in 0..30 {
        host.tick();
        let weights = host.renderer.blend_weights().unwrap();
        assert!(weights.iter().all(|(_, w)| (0.0..=1.0).contains(&w)));
    }

    assert_eq!(
        host.renderer.blend_weights().unwrap(),
        EmotionType::Sad.target_weights()
    );
    assert_eq!(
        host.renderer.state().unwrap().current_emotion,
        EmotionType::Sad
    );
}

#[test]
fn test_lip_sync_goes_stale_within_a_tick() {
    let mut host = TestHost::new();
    host.tick();

    let sample = AudioAnalysisResult::new(host.now + FRAME, 0.3);
    host.renderer.update_lip_sync(sample).unwrap();
    let report = host.tick();
    assert!(report.lip_sync_active);
    assert!(host.renderer.state().unwrap().lip_sync_active);

    // One frame interval later the sample is still current
    host.tick();
    // More than one interval without a new sample
    let report = host.tick();
    assert!(!report.lip_sync_active);
    assert!(!host.renderer.state().unwrap().lip_sync_active);
}

#[test]
fn test_future_stamped_sample_still_goes_stale() {
    let mut host = TestHost::new();
    host.tick();

    let skewed = AudioAnalysisResult::new(host.now + Duration::from_secs(10), 0.3);
    host.renderer.update_lip_sync(skewed).unwrap();
    assert!(host.tick().lip_sync_active);

    host.tick();
    assert!(!host.tick().lip_sync_active);
}

#[test]
fn test_lip_sync_from_another_thread() {
    let mut host = TestHost::new();
    host.tick();

    let inbox = host.renderer.lip_sync_sender().unwrap();
    let at = host.now + FRAME;
    std::thread::spawn(move || {
        inbox.push(AudioAnalysisResult::new(at - Duration::from_millis(4), 0.05));
        inbox.push(AudioAnalysisResult::new(at, 0.3));
    })
    .join()
    .unwrap();

    let report = host.tick();
    assert!(report.lip_sync_active);
    let weights = host.renderer.blend_weights().unwrap();
    assert!(BlendChannel::all()
        .iter()
        .filter(|c| c.is_viseme())
        .any(|c| weights.get(*c) > 0.0));
}

#[test]
fn test_play_twice_restarts_clip() {
    let mut host = TestHost::new();
    host.load_and_wait(ava());

    host.renderer.play_animation("talking").unwrap();
    assert_eq!(host.renderer.clip_time().unwrap(), Some(0.0));
    host.ticks(10);
    assert!(host.renderer.clip_time().unwrap().unwrap() > 0.0);

    host.renderer.play_animation("talking").unwrap();
    assert_eq!(host.renderer.clip_time().unwrap(), Some(0.0));
    host.tick();
    let after_one = host.renderer.clip_time().unwrap().unwrap();
    assert!((after_one - FRAME.as_secs_f32()).abs() < 1e-4);
}

#[test]
fn test_unknown_clip_leaves_state_unchanged() {
    let mut host = TestHost::new();
    host.load_and_wait(ava());
    host.renderer.play_animation("talking").unwrap();
    host.ticks(3);
    let time = host.renderer.clip_time().unwrap();

    assert_eq!(
        host.renderer.play_animation("nonexistent"),
        Err(AvatarError::AnimationNotFound("nonexistent".to_string()))
    );
    assert_eq!(host.renderer.clip_time().unwrap(), time);

    host.tick();
    let state = host.renderer.state().unwrap();
    assert_eq!(state.current_animation.as_deref(), Some("talking"));
    assert!(state.is_animating);
}

#[test]
fn test_one_shot_clip_finishes() {
    let mut host = TestHost::new();
    host.load_and_wait(ava());
    host.drain_events();

    host.renderer.play_animation("nodding").unwrap();
    // nodding lasts 1.0s
    host.ticks(70);

    let state = host.renderer.state().unwrap();
    assert!(!state.is_animating);
    assert_eq!(state.current_animation, None);
    assert!(host
        .drain_events()
        .contains(&AvatarEvent::AnimationFinished("nodding".to_string())));
}

#[test]
fn test_sustained_cost_steps_one_level_each_way() {
    let mut host = TestHost::new();
    let budget = EngineConfig::default().quality.frame_budget();

    // 3 windows of over-budget frames
    host.backend.set_frame_cost(Some(budget * 3));
    let down: Vec<_> = host
        .ticks(91)
        .into_iter()
        .filter_map(|r| r.quality_change)
        .collect();
    assert_eq!(down.len(), 1);
    assert_eq!((down[0].from, down[0].to), (0, 1));
    assert_eq!(host.renderer.state().unwrap().quality_level, 1);

    // 5 windows of cheap frames: one step back up, nothing else
    host.backend.set_frame_cost(Some(budget / 10));
    let up: Vec<_> = host
        .ticks(150)
        .into_iter()
        .filter_map(|r| r.quality_change)
        .collect();
    assert_eq!(up.len(), 1);
    assert_eq!((up[0].from, up[0].to), (1, 0));

    let quality_events = host
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, AvatarEvent::QualityChanged { .. }))
        .count();
    assert_eq!(quality_events, 2);
}

#[test]
fn test_unmeasured_timing_pins_quality() {
    let config = EngineConfig::default().with_quality(QualityConfig {
        initial_level: 2,
        ..QualityConfig::default()
    });
    let mut host = TestHost::with(config, HeadlessBackend::new().without_frame_timing());

    host.ticks(20);
    assert_eq!(host.renderer.state().unwrap().quality_level, 0);
    assert!(host.renderer.metrics().unwrap().render_ms.is_none());

    let events = host.drain_events();
    let warnings = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                AvatarEvent::CapabilityWarning(CapabilityWarning::FrameTimingUnavailable)
            )
        })
        .count();
    assert_eq!(warnings, 1);
    assert!(events.contains(&AvatarEvent::QualityChanged {
        from: 2,
        to: 0,
        profile: "ultra"
    }));
}

#[test]
fn test_resize_keeps_camera_and_target_consistent() {
    let mut host = TestHost::new();
    let budget = EngineConfig::default().quality.frame_budget();
    let ladder = QualityLadder::default();

    // Resizes interleaved with a quality step that changes the pixel ratio
    host.backend.set_frame_cost(Some(budget * 3));
    for (i, (w, h)) in [(1024, 768), (300, 900), (1920, 1080), (1, 1), (640, 360)]
        .into_iter()
        .cycle()
        .take(40)
        .enumerate()
    {
        host.renderer.resize(w, h).unwrap();
        host.ticks(1 + i % 3);
    }

    let frames = host.backend.frames();
    assert!(frames.len() > 60);
    for frame in frames {
        let profile = ladder.iter().find(|p| p.name == frame.profile).unwrap();
        assert_eq!(frame.camera_aspect, frame.surface.aspect());
        assert_eq!(frame.target, frame.surface.target(profile.pixel_ratio));
    }

    assert!(matches!(
        host.renderer.resize(0, 480),
        Err(AvatarError::InvalidViewport { width: 0, height: 480 })
    ));
}

#[test]
fn test_customization_biases_channel() {
    let mut host = TestHost::new();
    host.load_and_wait(ava().with_custom("blend.mouthSmile", serde_json::json!(0.4)));
    host.tick();

    let weights = host.renderer.blend_weights().unwrap();
    assert!(weights.get(BlendChannel::MouthSmile) >= 0.4);
}

#[test]
fn test_dispose_is_idempotent_and_terminal() {
    let mut host = TestHost::new();
    host.load_and_wait(ava());

    host.renderer.dispose();
    host.renderer.dispose();
    assert!(host.renderer.is_disposed());
    assert!(host.backend.is_released());
    let rendered = host.backend.frames_rendered();

    let disposed = |op| Err::<(), _>(AvatarError::DisposedStateViolation(op));
    assert_eq!(host.renderer.load(ava()).map(|_| ()), disposed("load"));
    assert_eq!(host.renderer.set_emotion(EmotionType::Happy), disposed("set_emotion"));
    assert_eq!(host.renderer.play_animation("idle"), disposed("play_animation"));
    assert_eq!(host.renderer.stop_animation(), disposed("stop_animation"));
    assert_eq!(host.renderer.resize(10, 10), disposed("resize"));
    assert_eq!(
        host.renderer
            .update_lip_sync(AudioAnalysisResult::new(Duration::ZERO, 0.2)),
        disposed("update_lip_sync")
    );
    assert_eq!(
        host.renderer.tick(Duration::from_secs(9)).map(|_| ()),
        disposed("tick")
    );
    assert_eq!(host.renderer.state().map(|_| ()), disposed("state"));
    assert_eq!(host.backend.frames_rendered(), rendered);
}

fn loaded_ids(events: impl IntoIterator<Item = AvatarEvent>) -> Vec<String> {
    events
        .into_iter()
        .filter_map(|e| match e {
            AvatarEvent::Loaded { config_id } => Some(config_id),
            _ => None,
        })
        .collect()
}

#[test]
fn test_every_subscriber_sees_loaded() {
    let mut host = TestHost::new();
    let second = host.renderer.subscribe().unwrap();

    host.load_and_wait(ava());

    assert_eq!(loaded_ids(host.drain_events()), vec!["ava".to_string()]);
    assert_eq!(loaded_ids(second.try_iter()), vec!["ava".to_string()]);
}

#[test]
fn test_state_backlog_does_not_swallow_loaded() {
    let mut host = TestHost::new();

    // A host that only polls snapshots never drains its events
    for i in 0..300 {
        let emotion = if i % 2 == 0 { EmotionType::Happy } else { EmotionType::Sad };
        host.renderer.set_emotion(emotion).unwrap();
        host.tick();
    }
    host.load_and_wait(ava());

    let events = host.drain_events();
    assert!(events.len() <= EngineConfig::default().events_capacity);
    assert_eq!(loaded_ids(events), vec!["ava".to_string()]);

    // once drained, the subscriber is handed the latest snapshot
    host.tick();
    let latest = host.renderer.state().unwrap();
    let caught_up = host.drain_events().into_iter().any(|e| match e {
        AvatarEvent::StateChanged(state) => state == latest,
        _ => false,
    });
    assert!(caught_up);
}

#[test]
fn test_cancelled_load_is_never_applied() {
    let mut host = TestHost::new();
    host.load_and_wait(ava());
    let usage = host.renderer.resource_usage().unwrap();
    host.drain_events();

    host.loader
        .insert_delayed("mem://slow", head_only(), Duration::from_millis(100));
    host.renderer
        .load(AvatarConfig::new("slow", "Slow", "mem://slow"))
        .unwrap();
    host.tick();
    assert!(host.renderer.state().unwrap().is_loading);

    host.renderer.cancel_load().unwrap();
    host.tick();
    assert!(!host.renderer.state().unwrap().is_loading);

    std::thread::sleep(Duration::from_millis(200));
    host.ticks(5);
    assert!(loaded_ids(host.drain_events()).is_empty());
    assert_eq!(host.renderer.resource_usage().unwrap(), usage);
    assert!(host.backend.last_frame().unwrap().has_scene);
}
