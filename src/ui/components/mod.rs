//! Viewer widgets

pub mod blend_meter;
pub mod debug_panel;

pub use blend_meter::BlendMeter;
pub use debug_panel::DebugPanel;
