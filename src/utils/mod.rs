pub mod channels;
pub mod perf;

pub use channels::{AvatarChannels, EventHub, LoaderChannels};
pub use perf::{FrameMetrics, Stopwatch, TimingTracker};
