//! Horizontal bars for the blend channel weights

use crate::expression::ChannelWeights;
use crate::ui::theme::Theme;
use egui::{Rect, RichText, Sense, Ui, Vec2};

const LABEL_WIDTH: f32 = 96.0;
const BAR_HEIGHT: f32 = 10.0;

pub struct BlendMeter<'a> {
    weights: &'a ChannelWeights,
    theme: &'a Theme,
}

impl<'a> BlendMeter<'a> {
    pub fn new(weights: &'a ChannelWeights, theme: &'a Theme) -> Self {
        Self { weights, theme }
    }

    pub fn show(&self, ui: &mut Ui) {
        for (channel, weight) in self.weights.iter() {
            ui.horizontal(|ui| {
                ui.add_sized(
                    [LABEL_WIDTH, BAR_HEIGHT],
                    egui::Label::new(
                        RichText::new(channel.shape_name())
                            .size(11.0)
                            .color(self.theme.text_muted),
                    ),
                );

                let width = (ui.available_width() - 40.0).max(20.0);
                let (rect, _) =
                    ui.allocate_exact_size(Vec2::new(width, BAR_HEIGHT), Sense::hover());
                if ui.is_rect_visible(rect) {
                    let fill = if channel.is_viseme() {
                        self.theme.meter_viseme
                    } else {
                        self.theme.meter_emotion
                    };
                    let painter = ui.painter();
                    painter.rect_filled(rect, 2.0, self.theme.meter_track);
                    let filled = Rect::from_min_size(
                        rect.min,
                        Vec2::new(rect.width() * weight.clamp(0.0, 1.0), rect.height()),
                    );
                    painter.rect_filled(filled, 2.0, fill);
                }

                ui.label(
                    RichText::new(format!("{:.2}", weight))
                        .monospace()
                        .size(11.0)
                        .color(self.theme.text_secondary),
                );
            });
        }
    }
}
