//! Broken-vsync detection
//!
//! A display that claims to wait for vertical refresh but does not will let
//! ticks run far faster than the refresh rate. Ticks are counted over windows
//! of one nominal second; a window that completes in 800 ms or less is a
//! failure, and three failures in a row mark vsync as broken for good.

/// A window finishing within this many milliseconds is too fast
pub const VSYNC_FAST_WINDOW_MS: u64 = 800;

/// Consecutive fast windows before vsync is declared broken
pub const VSYNC_FAIL_LIMIT: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct VsyncMonitor {
    window_start_ms: u64,
    window_ticks: u32,
    fail_streak: u32,
    broken: bool,
}

impl VsyncMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sticky once tripped
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn fail_streak(&self) -> u32 {
        self.fail_streak
    }

    /// Count one tick about to run at `now_ms`
    ///
    /// Returns true on the tick that trips the detector.
    pub fn observe_tick(&mut self, now_ms: u64, frame_time_ms: u32) -> bool {
        let frame_time_ms = frame_time_ms.max(1);
        self.window_ticks += 1;
        if self.window_ticks < 1000_u32.div_ceil(frame_time_ms) {
            return false;
        }

        let was_broken = self.broken;
        if now_ms.saturating_sub(self.window_start_ms) <= VSYNC_FAST_WINDOW_MS {
            self.fail_streak += 1;
            if self.fail_streak >= VSYNC_FAIL_LIMIT {
                self.broken = true;
            }
        } else {
            self.fail_streak = 0;
        }
        self.window_start_ms = now_ms;
        self.window_ticks = 0;

        if self.broken && !was_broken {
            tracing::warn!("Vsync appears broken; pacing ticks by timer");
            return true;
        }
        false
    }
}
