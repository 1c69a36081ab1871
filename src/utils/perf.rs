//! Frame timing utilities
//!
//! Rolling windows over frame durations and the per-frame metrics the
//! render loop reports.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Tracks durations over a sliding window
#[derive(Debug, Clone)]
pub struct TimingTracker {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl TimingTracker {
    /// Create a new timing tracker with the specified window size
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a new timing sample
    pub fn record(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    /// Get the average duration
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn min(&self) -> Duration {
        self.samples.iter().min().copied().unwrap_or(Duration::ZERO)
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or(Duration::ZERO)
    }

    /// Most recent sample
    pub fn last(&self) -> Option<Duration> {
        self.samples.back().copied()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_samples
    }

    /// Whether the window holds `capacity()` samples
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.max_samples
    }

    /// Clear all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Measures the wall-clock duration of a section
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> f32 {
        self.start.elapsed().as_secs_f32() * 1000.0
    }
}

/// Per-frame performance numbers shown to the host
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameMetrics {
    /// Frames per second over the rolling window
    pub fps: f32,
    /// Average tick-to-tick interval (ms)
    pub frame_time_ms: f32,
    /// Render cost of the last frame, if the backend could measure it (ms)
    pub render_ms: Option<f32>,
    pub draw_calls: u32,
    pub triangles: u64,
    /// Active quality ladder index
    pub quality_level: usize,
}

impl FrameMetrics {
    /// Build from a window of tick intervals
    pub fn from_intervals(intervals: &TimingTracker) -> Self {
        let average = intervals.average();
        let fps = if average.is_zero() {
            0.0
        } else {
            1.0 / average.as_secs_f32()
        };
        Self {
            fps,
            frame_time_ms: average.as_secs_f32() * 1000.0,
            ..Default::default()
        }
    }

    /// Generate a one-line summary
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("FPS: {:.0}", self.fps),
            format!("Frame: {:.1}ms", self.frame_time_ms),
        ];
        if let Some(render) = self.render_ms {
            parts.push(format!("Render: {:.2}ms", render));
        }
        parts.push(format!("Draws: {}", self.draw_calls));
        parts.push(format!("Tris: {}", self.triangles));
        parts.push(format!("Q{}", self.quality_level));
        parts.join(" | ")
    }
}
