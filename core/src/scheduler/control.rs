//! Pause, single-step, and rate multiplier controls
//!
//! These change pacing only. Ticks that do run are still gated by the demo
//! channel, so pausing or speeding up a replay never changes its outcome.

/// Preset rate multipliers, slowest first
pub const RATE_OPTIONS: [f64; 7] = [0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0];

const NORMAL_RATE_INDEX: usize = 3;

#[derive(Debug, Clone)]
pub struct FrameControl {
    paused: bool,
    /// Consumed by the next scheduler step
    step_requested: bool,
    rate_index: usize,
    /// Exact multiplier; may differ from the preset when set from config
    rate: f64,
}

impl Default for FrameControl {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameControl {
    /// Running at normal speed
    pub fn new() -> Self {
        Self {
            paused: false,
            step_requested: false,
            rate_index: NORMAL_RATE_INDEX,
            rate: RATE_OPTIONS[NORMAL_RATE_INDEX],
        }
    }

    /// Whether ticking is suspended
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Simulation speed relative to real time
    pub fn rate_multiplier(&self) -> f64 {
        self.rate
    }

    /// Flip between paused and running
    pub fn toggle_pause(&mut self) {
        self.set_paused(!self.paused);
    }

    /// Pause or resume; resuming drops any pending step
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if !paused {
            self.step_requested = false;
        }
    }

    /// Request a single tick (only while paused)
    pub fn request_step(&mut self) {
        if self.paused {
            self.step_requested = true;
        }
    }

    /// Consume a pending step request
    pub fn take_step(&mut self) -> bool {
        std::mem::take(&mut self.step_requested)
    }

    /// Step down to the next slower rate preset
    pub fn slower(&mut self) {
        if self.rate_index > 0 {
            self.rate_index -= 1;
            self.rate = RATE_OPTIONS[self.rate_index];
        }
    }

    /// Step up to the next faster rate preset
    pub fn faster(&mut self) {
        if self.rate_index < RATE_OPTIONS.len() - 1 {
            self.rate_index += 1;
            self.rate = RATE_OPTIONS[self.rate_index];
        }
    }

    /// Set the multiplier exactly; presets step from the nearest one
    ///
    /// Zero or negative rates stop ticking like a pause does.
    pub fn set_rate_multiplier(&mut self, rate: f64) {
        let mut best_idx = 0;
        let mut best_diff = f64::MAX;
        for (i, &preset) in RATE_OPTIONS.iter().enumerate() {
            let diff = (preset - rate).abs();
            if diff < best_diff {
                best_diff = diff;
                best_idx = i;
            }
        }
        self.rate_index = best_idx;
        self.rate = rate;
    }

    /// Back to running at normal speed
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
