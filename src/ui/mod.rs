//! eframe/egui viewer hosting the avatar renderer

mod app;
pub mod components;
mod theme;

pub use app::{AvatarViewerApp, DEMO_MODEL_URL};
pub use components::{BlendMeter, DebugPanel};
pub use theme::Theme;
