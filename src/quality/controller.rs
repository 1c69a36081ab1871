//! Adaptive quality controller
//!
//! Frame costs are averaged over non-overlapping windows of
//! `window_frames` frames. A window counts as over budget above
//! `budget * degrade_ratio` and under budget below `budget * upgrade_ratio`.
//! Only a run of consecutive over/under windows moves the profile, and then
//! by exactly one level, after which the window and both counters restart.

use crate::config::QualityConfig;
use crate::error::CapabilityWarning;
use crate::quality::profile::{QualityLadder, QualityProfile};
use crate::quality::registry::{CostClass, ObjectHandle, ObjectRegistry};
use crate::utils::perf::TimingTracker;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Measured cost of one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameCost {
    /// `None` when the backend cannot time frames
    pub render_time: Option<Duration>,
    pub draw_calls: u32,
    pub triangles: u64,
}

impl FrameCost {
    pub fn timed(render_time: Duration) -> Self {
        Self {
            render_time: Some(render_time),
            ..Default::default()
        }
    }

    pub fn unmeasured() -> Self {
        Self::default()
    }
}

/// A single-level move on the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityChange {
    pub from: usize,
    pub to: usize,
}

/// What one [`QualityController::update`] call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityUpdate {
    pub change: Option<QualityChange>,
    pub warning: Option<CapabilityWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowVerdict {
    Over,
    Under,
    Within,
}

#[derive(Debug)]
pub struct QualityController {
    config: QualityConfig,
    ladder: QualityLadder,
    level: usize,
    window: TimingTracker,
    over_windows: u32,
    under_windows: u32,
    timing_warned: bool,
    registry: ObjectRegistry,
}

impl QualityController {
    pub fn new(config: QualityConfig) -> Self {
        Self::with_ladder(config, QualityLadder::default())
    }

    pub fn with_ladder(config: QualityConfig, ladder: QualityLadder) -> Self {
        let level = ladder.clamp(config.initial_level);
        let window = TimingTracker::new(config.window_frames);
        Self {
            config,
            ladder,
            level,
            window,
            over_windows: 0,
            under_windows: 0,
            timing_warned: false,
            registry: ObjectRegistry::new(),
        }
    }

    /// Register an object for cost accounting. Idempotent per handle.
    pub fn track_object(&mut self, handle: ObjectHandle, class: CostClass) -> bool {
        let profile = self.ladder.get(self.level);
        self.registry.track(handle, class, profile)
    }

    pub fn untrack_object(&mut self, handle: ObjectHandle) -> bool {
        self.registry.untrack(handle)
    }

    /// Feed the previous frame's cost
    pub fn update(&mut self, cost: &FrameCost) -> QualityUpdate {
        match cost.render_time {
            Some(render_time) => QualityUpdate {
                change: self.record(render_time),
                warning: None,
            },
            None => self.pin_unmeasured(),
        }
    }

    fn record(&mut self, render_time: Duration) -> Option<QualityChange> {
        self.window.record(render_time);
        if !self.window.is_full() {
            return None;
        }

        let average = self.window.average();
        self.window.clear();

        match self.classify(average) {
            WindowVerdict::Over => {
                self.over_windows += 1;
                self.under_windows = 0;
            }
            WindowVerdict::Under => {
                self.under_windows += 1;
                self.over_windows = 0;
            }
            WindowVerdict::Within => {
                self.over_windows = 0;
                self.under_windows = 0;
            }
        }
        debug!(
            "Frame window avg {:.2}ms (over {}, under {})",
            average.as_secs_f32() * 1000.0,
            self.over_windows,
            self.under_windows
        );

        let target = if self.over_windows >= self.config.degrade_windows {
            self.ladder.step_down(self.level)
        } else if self.under_windows >= self.config.upgrade_windows {
            self.ladder.step_up(self.level)
        } else {
            return None;
        };

        self.over_windows = 0;
        self.under_windows = 0;
        target.map(|to| self.set_level(to))
    }

    // Compared in seconds so extreme ratios cannot overflow a `Duration`
    fn classify(&self, average: Duration) -> WindowVerdict {
        let average = average.as_secs_f32();
        let budget = self.config.frame_budget().as_secs_f32();
        if average > budget * self.config.degrade_ratio {
            WindowVerdict::Over
        } else if average < budget * self.config.upgrade_ratio {
            WindowVerdict::Under
        } else {
            WindowVerdict::Within
        }
    }

    fn pin_unmeasured(&mut self) -> QualityUpdate {
        let mut update = QualityUpdate::default();
        if !self.timing_warned {
            warn!("{}", CapabilityWarning::FrameTimingUnavailable);
            self.timing_warned = true;
            update.warning = Some(CapabilityWarning::FrameTimingUnavailable);
        }

        self.reset_window();
        let pinned = self.ladder.clamp(self.config.unmeasured_level);
        if pinned != self.level {
            update.change = Some(self.set_level(pinned));
        }
        update
    }

    fn set_level(&mut self, to: usize) -> QualityChange {
        let change = QualityChange {
            from: self.level,
            to,
        };
        self.level = to;
        let profile = self.ladder.get(to);
        self.registry.apply_profile(profile);
        info!(
            "Quality {} -> {} ({})",
            change.from, change.to, profile.name
        );
        change
    }

    /// Forget the current window and consecutive-window counters
    pub fn reset_window(&mut self) {
        self.window.clear();
        self.over_windows = 0;
        self.under_windows = 0;
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn profile(&self) -> &QualityProfile {
        self.ladder.get(self.level)
    }

    pub fn ladder(&self) -> &QualityLadder {
        &self.ladder
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Drop every tracked object
    pub fn clear_objects(&mut self) {
        self.registry.clear();
    }
}
