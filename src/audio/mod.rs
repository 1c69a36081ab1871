//! Audio hand-off for lip-sync: PCM analysis and the sample inbox between
//! the audio callback and the render tick

pub mod analysis;
pub mod buffer;

pub use analysis::analyze_frame;
pub use buffer::SampleInbox;
