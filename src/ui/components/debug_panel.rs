//! Debug panel showing the avatar snapshot and frame metrics

use crate::state::AvatarState;
use crate::ui::theme::Theme;
use crate::utils::perf::FrameMetrics;
use egui::{Color32, RichText, Ui};

pub struct DebugPanel<'a> {
    state: &'a AvatarState,
    metrics: &'a FrameMetrics,
    theme: &'a Theme,
    lowest_level: usize,
}

impl<'a> DebugPanel<'a> {
    pub fn new(
        state: &'a AvatarState,
        metrics: &'a FrameMetrics,
        theme: &'a Theme,
        lowest_level: usize,
    ) -> Self {
        Self {
            state,
            metrics,
            theme,
            lowest_level,
        }
    }

    pub fn show(&self, ui: &mut Ui) {
        ui.group(|ui| {
            ui.vertical(|ui| {
                ui.horizontal(|ui| {
                    ui.label(
                        RichText::new("Avatar State")
                            .strong()
                            .size(14.0)
                            .color(self.theme.text_primary),
                    );
                    ui.add_space(8.0);
                    let badge = if self.state.is_loading {
                        RichText::new("LOADING").color(self.theme.warning).strong()
                    } else if self.state.is_loaded {
                        RichText::new("LIVE").color(self.theme.success).strong()
                    } else {
                        RichText::new("EMPTY").color(self.theme.text_muted).strong()
                    };
                    ui.label(badge);
                });

                ui.separator();

                egui::Grid::new("avatar_state_grid")
                    .num_columns(2)
                    .spacing([20.0, 4.0])
                    .striped(true)
                    .show(ui, |ui| {
                        self.state_row(
                            ui,
                            "Emotion",
                            self.state.current_emotion.as_str(),
                            self.theme.emotion_color(self.state.current_emotion),
                        );
                        self.state_row(
                            ui,
                            "Animation",
                            self.state.current_animation.as_deref().unwrap_or("(idle)"),
                            Self::bool_color(self.state.is_animating, self.theme),
                        );
                        self.state_row(
                            ui,
                            "Lip Sync",
                            if self.state.lip_sync_active { "active" } else { "off" },
                            Self::bool_color(self.state.lip_sync_active, self.theme),
                        );
                        self.state_row(
                            ui,
                            "Quality",
                            &format!(
                                "{} ({})",
                                self.state.quality_profile, self.state.quality_level
                            ),
                            self.theme
                                .quality_color(self.state.quality_level, self.lowest_level),
                        );

                        ui.end_row();
                        ui.separator();
                        ui.separator();
                        ui.end_row();

                        self.state_row(
                            ui,
                            "FPS",
                            &format!("{:.0}", self.metrics.fps),
                            self.theme.text_secondary,
                        );
                        self.state_row(
                            ui,
                            "Frame",
                            &format!("{:.1} ms", self.metrics.frame_time_ms),
                            self.theme.text_secondary,
                        );
                        let render = match self.metrics.render_ms {
                            Some(ms) => format!("{:.2} ms", ms),
                            None => "unmeasured".to_string(),
                        };
                        self.state_row(ui, "Render", &render, self.theme.text_secondary);
                        self.state_row(
                            ui,
                            "Draw Calls",
                            &self.metrics.draw_calls.to_string(),
                            self.theme.text_secondary,
                        );
                        self.state_row(
                            ui,
                            "Triangles",
                            &self.metrics.triangles.to_string(),
                            self.theme.text_secondary,
                        );

                        ui.end_row();
                        ui.separator();
                        ui.separator();
                        ui.end_row();

                        let (error, color) = match &self.state.error {
                            Some(error) => (error.as_str(), self.theme.error),
                            None => ("(none)", self.theme.text_muted),
                        };
                        self.state_row(ui, "Error", error, color);
                    });
            });
        });
    }

    fn state_row(&self, ui: &mut Ui, label: &str, value: &str, value_color: Color32) {
        ui.label(RichText::new(label).color(self.theme.text_muted).size(12.0));
        ui.label(RichText::new(value).color(value_color).monospace().size(12.0));
        ui.end_row();
    }

    fn bool_color(value: bool, theme: &Theme) -> Color32 {
        if value {
            theme.success
        } else {
            theme.text_muted
        }
    }
}
