//! Avatar viewer application
//!
//! Hosts an [`AvatarRenderer`] from the egui repaint callback. The renderer
//! draws through a [`HeadlessBackend`]; the viewer paints a schematic face
//! from the blend weights next to the debug panel.

use crate::audio::analyze_frame;
use crate::config::{AvatarConfig, EngineConfig};
use crate::expression::{BlendChannel, ChannelWeights, EmotionType};
use crate::model::{InMemoryLoader, ModelManifest};
use crate::quality::QualityLadder;
use crate::render::{AvatarRenderer, HeadlessBackend, Viewport};
use crate::state::{AvatarEvent, AvatarState};
use crate::ui::components::{BlendMeter, DebugPanel};
use crate::ui::theme::Theme;
use crate::utils::perf::FrameMetrics;
use crate::AvatarError;
use crossbeam_channel::Receiver;
use egui::{
    CentralPanel, Color32, Pos2, Rect, RichText, Rounding, Sense, SidePanel, Stroke, TopBottomPanel, Vec2,
    WidgetInfo, WidgetType,
};
use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEMO_MODEL_URL: &str = "mem://demo-avatar";

const SPEECH_SAMPLE_RATE: u32 = 16_000;
/// Synthetic speech repeats every 2 s so the phase stays precise
const SPEECH_PERIOD: f32 = 2.0;
const MAX_EVENT_LOG: usize = 8;

pub struct AvatarViewerApp {
    renderer: AvatarRenderer,
    theme: Theme,
    clock: Instant,

    speaking: bool,
    speech_phase: f32,
    last_speech: Option<Duration>,

    state: Arc<AvatarState>,
    metrics: FrameMetrics,
    weights: ChannelWeights,
    clips: Vec<String>,
    events: Receiver<AvatarEvent>,
    event_log: VecDeque<String>,
    banner: Option<String>,
    lowest_level: usize,
}

impl AvatarViewerApp {
    /// Create the viewer and start loading the demo avatar
    pub fn new(config: EngineConfig) -> crate::Result<Self> {
        let loader = InMemoryLoader::new();
        loader.insert(DEMO_MODEL_URL, ModelManifest::demo());

        let mut renderer = AvatarRenderer::new(
            config,
            Arc::new(loader),
            Box::new(HeadlessBackend::new()),
            Viewport::new(800, 600)?,
        )?;
        renderer.load(Self::demo_config())?;

        let state = renderer.state()?;
        let events = renderer.subscribe()?;

        Ok(Self {
            renderer,
            theme: Theme::dark(),
            clock: Instant::now(),
            speaking: false,
            speech_phase: 0.0,
            last_speech: None,
            state,
            metrics: FrameMetrics::default(),
            weights: ChannelWeights::zero(),
            clips: Vec::new(),
            events,
            event_log: VecDeque::new(),
            banner: None,
            lowest_level: QualityLadder::default().lowest(),
        })
    }

    pub fn with_creation_context(
        cc: &eframe::CreationContext<'_>,
        config: EngineConfig,
    ) -> crate::Result<Self> {
        let app = Self::new(config)?;
        app.theme.apply(&cc.egui_ctx);
        Ok(app)
    }

    fn demo_config() -> AvatarConfig {
        AvatarConfig::new("demo", "Demo Avatar", DEMO_MODEL_URL)
    }

    pub fn state(&self) -> &AvatarState {
        &self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Most recent events, oldest first
    pub fn event_log(&self) -> impl Iterator<Item = &str> {
        self.event_log.iter().map(String::as_str)
    }

    fn report(&mut self, error: AvatarError) {
        warn!("[VIEWER] {}", error);
        self.banner = Some(error.user_message());
    }

    /// Run one renderer tick and refresh the cached view data
    fn tick_renderer(&mut self, ctx: &egui::Context) {
        let now = self.clock.elapsed();

        let size = ctx.screen_rect().size();
        if size.x >= 1.0 && size.y >= 1.0 {
            if let Err(e) = self.renderer.resize(size.x as u32, size.y as u32) {
                debug!("[VIEWER] Ignoring resize: {}", e);
            }
        }

        if self.speaking {
            self.synthesize_speech(now);
        }

        if let Err(e) = self.renderer.tick(now) {
            self.report(e);
            return;
        }

        while let Ok(event) = self.events.try_recv() {
            self.record_event(event);
        }

        if let (Ok(state), Ok(metrics), Ok(weights)) = (
            self.renderer.state(),
            self.renderer.metrics(),
            self.renderer.blend_weights(),
        ) {
            self.state = state;
            self.metrics = metrics;
            self.weights = weights;
        }
    }

    fn record_event(&mut self, event: AvatarEvent) {
        let line = match event {
            AvatarEvent::Loaded { config_id } => {
                self.banner = None;
                self.clips = self.renderer.clip_names().unwrap_or_default();
                format!("loaded '{}'", config_id)
            }
            AvatarEvent::Error { config_id, error } => {
                self.banner = Some(AvatarError::Asset(error.clone()).user_message());
                format!("load of '{}' failed: {}", config_id, error)
            }
            AvatarEvent::QualityChanged { from, to, profile } => {
                format!("quality {} -> {} ({})", from, to, profile)
            }
            AvatarEvent::CapabilityWarning(warning) => format!("warning: {}", warning),
            AvatarEvent::AnimationFinished(clip) => format!("finished '{}'", clip),
            AvatarEvent::StateChanged(_) => return,
        };
        info!("[VIEWER] {}", line);
        if self.event_log.len() >= MAX_EVENT_LOG {
            self.event_log.pop_front();
        }
        self.event_log.push_back(line);
    }

    /// Feed one frame of a synthetic voice into lip-sync
    fn synthesize_speech(&mut self, now: Duration) {
        let elapsed = match self.last_speech {
            Some(last) => now.saturating_sub(last),
            None => Duration::from_millis(16),
        };
        self.last_speech = Some(now);

        let count = ((elapsed.as_secs_f32() * SPEECH_SAMPLE_RATE as f32) as usize).clamp(64, 4096);
        let step = 1.0 / SPEECH_SAMPLE_RATE as f32;
        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            let t = self.speech_phase;
            let syllable = (TAU * 3.5 * t).sin().abs();
            let voice = (TAU * 180.0 * t).sin() + 0.4 * (TAU * 900.0 * t).sin();
            samples.push(0.25 * syllable * voice);
            self.speech_phase += step;
            if self.speech_phase >= SPEECH_PERIOD {
                self.speech_phase -= SPEECH_PERIOD;
            }
        }

        let sample = analyze_frame(&samples, SPEECH_SAMPLE_RATE, now);
        if let Err(e) = self.renderer.update_lip_sync(sample) {
            self.report(e);
        }
    }

    fn toggle_speech(&mut self) {
        self.speaking = !self.speaking;
        self.last_speech = None;
        info!("[VIEWER] Synthetic speech {}", if self.speaking { "on" } else { "off" });
    }

    /// Draw one frame of the viewer
    pub fn ui(&mut self, ctx: &egui::Context) {
        self.tick_renderer(ctx);

        TopBottomPanel::top("viewer_header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(RichText::new("Babble Avatar").color(self.theme.text_primary));
                ui.add_space(self.theme.spacing);
                ui.label(RichText::new(self.state.status_text()).color(self.theme.text_secondary));
            });
            if let Some(banner) = &self.banner {
                ui.label(RichText::new(banner).color(self.theme.error));
            }
        });

        SidePanel::right("viewer_debug")
            .resizable(false)
            .default_width(300.0)
            .show(ctx, |ui| {
                DebugPanel::new(&self.state, &self.metrics, &self.theme, self.lowest_level).show(ui);
                ui.add_space(self.theme.spacing_sm);
                BlendMeter::new(&self.weights, &self.theme).show(ui);
                ui.add_space(self.theme.spacing_sm);
                ui.label(RichText::new("Events").strong().color(self.theme.text_primary));
                for line in &self.event_log {
                    ui.label(RichText::new(line).size(11.0).color(self.theme.text_muted));
                }
            });

        CentralPanel::default().show(ctx, |ui| {
            self.controls(ui);
            ui.add_space(self.theme.spacing);
            self.paint_face(ui);
        });
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            for &emotion in EmotionType::all() {
                let selected = self.state.current_emotion == emotion;
                let title = emotion_title(emotion);
                let label = RichText::new(title).color(self.theme.emotion_color(emotion));
                let response = ui.selectable_label(selected, label);
                response.widget_info(|| {
                    WidgetInfo::selected(WidgetType::SelectableLabel, true, selected, format!("Emotion {}", title))
                });
                if response.clicked() {
                    if let Err(e) = self.renderer.set_emotion(emotion) {
                        self.report(e);
                    }
                }
            }
        });

        ui.horizontal_wrapped(|ui| {
            for clip in self.clips.clone() {
                let response = ui.button(clip.as_str());
                response.widget_info(|| {
                    WidgetInfo::labeled(WidgetType::Button, true, format!("Play {}", clip))
                });
                if response.clicked() {
                    if let Err(e) = self.renderer.play_animation(&clip) {
                        self.report(e);
                    }
                }
            }
            let response = ui.button("Stop");
            response.widget_info(|| WidgetInfo::labeled(WidgetType::Button, true, "Stop animation"));
            if response.clicked() {
                if let Err(e) = self.renderer.stop_animation() {
                    self.report(e);
                }
            }
        });

        ui.horizontal(|ui| {
            let text = if self.speaking { "Stop speaking" } else { "Start speaking" };
            let response = ui.button(text);
            response.widget_info(|| WidgetInfo::labeled(WidgetType::Button, true, "Toggle speech"));
            if response.clicked() {
                self.toggle_speech();
            }

            let response = ui.button("Reload");
            response.widget_info(|| WidgetInfo::labeled(WidgetType::Button, true, "Reload avatar"));
            if response.clicked() {
                if let Err(e) = self.renderer.load(Self::demo_config()) {
                    self.report(e);
                }
            }
        });
    }

    /// Schematic face driven by the blend weights
    fn paint_face(&self, ui: &mut egui::Ui) {
        let size = ui.available_size().min(Vec2::splat(360.0)).max(Vec2::splat(120.0));
        let (rect, _) = ui.allocate_exact_size(size, Sense::hover());
        if !ui.is_rect_visible(rect) {
            return;
        }

        let painter = ui.painter();
        let center = rect.center();
        let radius = rect.width().min(rect.height()) * 0.45;
        let w = |c: BlendChannel| self.weights.get(c);

        let skin = if self.state.is_loaded {
            Color32::from_rgb(232, 190, 160)
        } else {
            self.theme.bg_tertiary
        };
        painter.circle_filled(center, radius, skin);

        // eyes
        let eye_open = (1.0 + 0.6 * w(BlendChannel::EyeWide) - 0.7 * w(BlendChannel::EyeSquint)).max(0.15);
        let eye_size = Vec2::new(radius * 0.2, radius * 0.12 * eye_open);
        for side in [-1.0, 1.0] {
            let eye_center = center + Vec2::new(side * radius * 0.35, -radius * 0.2);
            painter.rect_filled(
                Rect::from_center_size(eye_center, eye_size),
                Rounding::same(eye_size.y * 0.5),
                Color32::from_rgb(40, 40, 48),
            );

            let lift = radius * (0.12 * w(BlendChannel::BrowInnerUp) - 0.1 * w(BlendChannel::BrowDown));
            let brow_y = eye_center.y - radius * 0.18 - lift;
            let inner = Pos2::new(eye_center.x - side * radius * 0.12, brow_y - lift * 0.5);
            let outer = Pos2::new(eye_center.x + side * radius * 0.14, brow_y + lift * 0.3);
            painter.line_segment([inner, outer], Stroke::new(3.0, Color32::from_rgb(90, 60, 40)));
        }

        // cheeks
        let blush = w(BlendChannel::CheekRaise);
        if blush > 0.01 {
            let color = Color32::from_rgba_unmultiplied(230, 120, 120, (blush * 160.0) as u8);
            for side in [-1.0, 1.0] {
                painter.circle_filled(center + Vec2::new(side * radius * 0.5, radius * 0.12), radius * 0.1, color);
            }
        }

        // mouth
        let open = w(BlendChannel::MouthOpen)
            .max(w(BlendChannel::VisemeAA))
            .max(w(BlendChannel::VisemeOH) * 0.8);
        let width = radius
            * (0.5 + 0.2 * w(BlendChannel::MouthSmile) + 0.15 * w(BlendChannel::VisemeEE)
                - 0.2 * w(BlendChannel::VisemeOH));
        let height = radius * (0.04 + 0.3 * open);
        let mouth_y = center.y + radius * (0.45 + 0.05 * w(BlendChannel::MouthFrown) - 0.05 * w(BlendChannel::MouthSmile));
        painter.rect_filled(
            Rect::from_center_size(Pos2::new(center.x, mouth_y), Vec2::new(width, height)),
            Rounding::same(height.min(width) * 0.5),
            Color32::from_rgb(120, 40, 50),
        );
    }
}

impl eframe::App for AvatarViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui(ctx);
        ctx.request_repaint();
    }
}

fn emotion_title(emotion: EmotionType) -> &'static str {
    match emotion {
        EmotionType::Neutral => "Neutral",
        EmotionType::Happy => "Happy",
        EmotionType::Sad => "Sad",
        EmotionType::Angry => "Angry",
        EmotionType::Surprised => "Surprised",
        EmotionType::Thinking => "Thinking",
    }
}
