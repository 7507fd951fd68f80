//! Adaptive fixed-timestep scheduler
//!
//! The scheduler is the only code that reads the wall clock and the only code
//! that advances the demo tick counter. Each outer iteration moves through
//! [`UpdatePhase`]:
//!
//! - `Messages`: dispatch due replay commands and one OS event
//! - `Process1`: at most one tick, gated by the time accumulator
//! - `Process2`: extra ticks owed when several ticks fit in one draw
//! - `Done`: draw if a tick happened, otherwise sleep until the next is due
//!
//! During replay, ticks are additionally gated by the demo channel so they
//! land exactly where the recording had them, and a fast-forward request
//! bypasses pacing entirely.

pub mod clock;
pub mod control;
pub mod loading;
pub mod vsync;

use std::fmt;

use anyhow::Result;

pub use clock::{Clock, ManualClock, SystemClock};
pub use control::FrameControl;
pub use loading::LoadingTracker;
pub use vsync::VsyncMonitor;

use crate::config::TimingConfig;
use crate::context::AppContext;
use crate::demo::{Command, InputEvent, VideoMode};
use crate::host::Host;

/// Catch-up is suppressed for this long after [`Scheduler::clear_update_backlog`] with `relax`
pub const RELAX_BACKLOG_MS: f64 = 1000.0;

/// Upper bound on the per-iteration sleep while a loader runs
pub const MAX_LOADING_YIELD_MS: i64 = 250;

/// A fast-forward draws (and yields) at least this often
pub const FAST_FORWARD_DRAW_INTERVAL_MS: u64 = 1000;

/// Tick duration worth a warning
pub const SLOW_TICK_MS: u64 = 250;

/// Refresh rate assumed until the host reports one
pub const DEFAULT_REFRESH_RATE: u32 = 60;

/// Where the scheduler is within one outer iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Messages,
    Process1,
    Process2,
    Done,
}

/// Counters reported when a run ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u32,
    pub draws: u32,
    pub sleeps: u32,
    pub slept_ms: u64,
    pub elapsed_ms: u64,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}s, {} ticks, {} draws, {} sleeps ({} ms)",
            self.elapsed_ms as f64 / 1000.0,
            self.ticks,
            self.draws,
            self.sleeps,
            self.slept_ms
        )
    }
}

pub struct Scheduler<C: Clock> {
    clock: C,
    timing: TimingConfig,
    control: FrameControl,
    phase: UpdatePhase,

    /// Real time owed to the simulation
    accumulator_ms: f64,
    last_check_ms: Option<u64>,
    /// While positive, Process2 discards the accumulator
    relax_ms: f64,
    /// Fractional extra ticks owed per draw
    pending_updates: f64,
    non_draw_count: u32,
    has_pending_draw: bool,
    last_draw_was_empty: bool,

    vsync: VsyncMonitor,
    windowed: bool,
    refresh_rate: u32,

    loaded: bool,
    muted: bool,
    fast_forward_since: Option<u64>,
    stats: RunStats,
}

impl<C: Clock> fmt::Debug for Scheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("phase", &self.phase)
            .field("accumulator_ms", &self.accumulator_ms)
            .field("loaded", &self.loaded)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, timing: &TimingConfig) -> Self {
        let mut control = FrameControl::new();
        control.set_rate_multiplier(timing.rate_multiplier);
        Self {
            clock,
            timing: timing.clone(),
            control,
            phase: UpdatePhase::Messages,
            accumulator_ms: 0.0,
            last_check_ms: None,
            relax_ms: 0.0,
            pending_updates: 0.0,
            non_draw_count: 0,
            has_pending_draw: true,
            last_draw_was_empty: false,
            vsync: VsyncMonitor::new(),
            windowed: true,
            refresh_rate: DEFAULT_REFRESH_RATE,
            loaded: false,
            muted: false,
            fast_forward_since: None,
            stats: RunStats::default(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn control(&self) -> &FrameControl {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut FrameControl {
        &mut self.control
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn accumulator_ms(&self) -> f64 {
        self.accumulator_ms
    }

    /// Whether the simulation has left its loading state
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn vsync_broken(&self) -> bool {
        self.vsync.is_broken()
    }

    pub fn refresh_rate(&self) -> u32 {
        self.refresh_rate
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Display mode reported by the host
    pub fn set_display(&mut self, windowed: bool, refresh_rate: u32) {
        self.windowed = windowed;
        self.refresh_rate = refresh_rate.max(1);
    }

    /// Record the display mode so a replay paces fractional updates the same way
    pub fn sync_video_mode(&mut self, ctx: &mut AppContext) {
        ctx.demo.record(&Command::VideoMode {
            windowed: self.windowed,
            refresh_rate: self.refresh_rate.min(u32::from(u8::MAX)) as u8,
        });
    }

    fn adopt_video_mode(&mut self, mode: VideoMode) {
        tracing::debug!(
            "Replay video mode: windowed {}, {} Hz",
            mode.windowed,
            mode.refresh_rate
        );
        self.set_display(mode.windowed, u32::from(mode.refresh_rate));
    }

    // ------------------------------------------------------------------
    // Timing
    // ------------------------------------------------------------------

    fn is_vsynced(&self, ctx: &AppContext) -> bool {
        !ctx.demo.is_replaying()
            && self.timing.vsync_updates
            && !self.last_draw_was_empty
            && !self.vsync.is_broken()
            && (!self.windowed || (self.timing.wait_for_vsync && !self.timing.soft_vsync_wait))
    }

    /// Milliseconds of real time per tick at the current rate
    fn frame_budget_ms(&self) -> f64 {
        let rate = self.control.rate_multiplier();
        if self.timing.vsync_updates {
            (1000.0 / f64::from(self.refresh_rate)) / rate
        } else {
            f64::from(self.timing.frame_time_ms) / rate
        }
    }

    /// Ticks represented by one draw
    fn updates_per_draw(&self) -> f64 {
        if self.timing.vsync_updates {
            1000.0 / (f64::from(self.timing.frame_time_ms.max(1)) * f64::from(self.refresh_rate))
        } else {
            1.0
        }
    }

    /// Consecutive ticks allowed without a draw once loaded
    fn max_ticks_per_draw(&self) -> u32 {
        let ticks_per_second = 1000.0 / f64::from(self.timing.frame_time_ms.max(1));
        let per_draw = ticks_per_second / f64::from(self.timing.min_draws_per_second.max(1));
        (per_draw * self.control.rate_multiplier()).ceil() as u32
    }

    fn update_accumulator(&mut self) {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_check_ms {
            let delta = now.saturating_sub(last) as f64;
            self.accumulator_ms = (self.accumulator_ms + delta).min(self.timing.max_accumulator_ms);
            if self.relax_ms > 0.0 {
                self.relax_ms = (self.relax_ms - delta).max(0.0);
            }
        }
        self.last_check_ms = Some(now);
    }

    /// Forget owed time, optionally suppressing catch-up for a second
    pub fn clear_update_backlog(&mut self, relax: bool) {
        self.last_check_ms = Some(self.clock.now_ms());
        self.accumulator_ms = 0.0;
        if relax {
            self.relax_ms = RELAX_BACKLOG_MS;
        }
    }

    fn sleep(&mut self, ms: u64) {
        self.stats.sleeps += 1;
        self.stats.slept_ms += ms;
        self.clock.sleep_ms(ms);
    }

    // ------------------------------------------------------------------
    // Ticks
    // ------------------------------------------------------------------

    /// Dispatch every replay command due at the current tick
    fn process_demo<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<()> {
        if !ctx.demo.is_replaying() {
            return Ok(());
        }
        while let Some(event) = ctx.demo.next_due_event()? {
            tracing::trace!("Replay {} at tick {}", event, ctx.demo.update_count());
            host.dispatch(ctx, event)?;
        }
        if let Some(mode) = ctx.demo.take_video_mode() {
            self.adopt_video_mode(mode);
        }
        Ok(())
    }

    fn finish_loading<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<()> {
        self.loaded = true;
        tracing::info!("Loading complete at tick {}", ctx.demo.update_count());
        host.loading_completed(ctx)
    }

    /// Run one tick if the demo allows it; false if no tick happened
    fn do_update<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<bool> {
        if ctx.demo.is_replaying() {
            if ctx.demo.replay_finished() {
                if !ctx.is_shutdown() {
                    tracing::info!("Replay finished after {} ticks", ctx.demo.update_count());
                    ctx.request_shutdown();
                }
                return Ok(false);
            }

            let demo_loaded = ctx.demo.replay_loading_complete();
            if ctx.loading.is_done() && !self.loaded && demo_loaded {
                self.finish_loading(ctx, host)?;
            }
            if self.loaded == demo_loaded && ctx.demo.replay_can_tick()? {
                self.tick(ctx, host)?;
                return Ok(true);
            }
            return Ok(false);
        }

        if ctx.loading.is_done() && !self.loaded {
            // Recorded first so replay sees it before anything the host does in response
            ctx.demo.record(&Command::LoadingComplete);
            self.finish_loading(ctx, host)?;
        }
        self.tick(ctx, host)?;
        Ok(true)
    }

    fn tick<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<()> {
        ctx.demo.advance_tick();
        self.stats.ticks += 1;

        let start = self.clock.now_ms();
        host.update(ctx)?;
        let took = self.clock.now_ms().saturating_sub(start);
        if took >= SLOW_TICK_MS {
            tracing::warn!("Tick {} took {} ms", ctx.demo.update_count(), took);
        }
        Ok(())
    }

    fn update_fractional<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H, fraction: f64) {
        if self.timing.vsync_updates {
            host.update_fractional(ctx, fraction);
        }
    }

    fn draw<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<()> {
        let drew = host.draw(ctx)?;
        self.has_pending_draw = false;
        self.last_draw_was_empty = !drew;
        if drew {
            self.stats.draws += 1;
            // The one accumulator update per frame when vsynced
            self.update_accumulator();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Outer loop
    // ------------------------------------------------------------------

    /// Catch up with a replay fast-forward, ignoring real-time pacing
    fn fast_forward<H: Host + ?Sized>(
        &mut self,
        ctx: &mut AppContext,
        host: &mut H,
        per_draw: f64,
    ) -> Result<bool> {
        if !self.muted {
            self.muted = true;
            host.set_muted(true);
        }
        let window_start = *self.fast_forward_since.get_or_insert(self.clock.now_ms());

        while ctx.demo.fast_forward_active() && !ctx.is_shutdown() {
            self.clear_update_backlog(false);
            let before = ctx.demo.update_count();

            self.process_demo(ctx, host)?;
            if self.do_update(ctx, host)? {
                self.pending_updates += per_draw - 1.0;
                while self.pending_updates >= 1.0 {
                    self.process_demo(ctx, host)?;
                    if !self.do_update(ctx, host)? {
                        break;
                    }
                    self.pending_updates -= 1.0;
                }
                self.update_fractional(ctx, host, per_draw);
            }

            // Waiting on the loader or at the end of the stream
            if ctx.demo.update_count() == before {
                return Ok(true);
            }

            let now = self.clock.now_ms();
            if now.saturating_sub(window_start) >= FAST_FORWARD_DRAW_INTERVAL_MS {
                self.fast_forward_since = Some(now);
                self.draw(ctx, host)?;
                return Ok(true);
            }
        }
        Ok(true)
    }

    /// One pass of the tick/draw state machine
    ///
    /// Returns false when sleeping was needed but `allow_sleep` was not set.
    pub fn process<H: Host + ?Sized>(
        &mut self,
        ctx: &mut AppContext,
        host: &mut H,
        allow_sleep: bool,
    ) -> Result<bool> {
        if ctx.loading.has_failed() {
            if !ctx.is_shutdown() {
                tracing::error!("Loading failed, shutting down");
                ctx.request_shutdown();
            }
            return Ok(true);
        }

        let vsynced = self.is_vsynced(ctx);
        let frame_ms = self.frame_budget_ms();
        let per_draw = self.updates_per_draw();

        if ctx.demo.is_replaying() {
            if ctx.demo.fast_forward_active() {
                return self.fast_forward(ctx, host, per_draw);
            }
            if self.muted {
                self.muted = false;
                self.fast_forward_since = None;
                host.set_muted(false);
            }
        }

        let rate = self.control.rate_multiplier();
        if self.control.is_paused() || rate <= 0.0 {
            return Ok(true);
        }

        let start = self.clock.now_ms();
        let mut slept_ms: i64 = 0;

        if !vsynced {
            self.update_accumulator();
        }

        let mut did_update = false;
        match self.phase {
            UpdatePhase::Process1 => {
                self.non_draw_count += 1;
                if self.non_draw_count < self.max_ticks_per_draw() || !self.loaded {
                    let due = if vsynced {
                        !self.has_pending_draw || self.accumulator_ms >= (frame_ms * 0.75).floor()
                    } else {
                        self.accumulator_ms >= frame_ms
                    };

                    if due {
                        if !ctx.demo.is_replaying() && (rate - 1.0).abs() < f64::EPSILON {
                            self.vsync.observe_tick(start, self.timing.frame_time_ms);
                        }

                        // A blocked replay tick ends the pass so due input gets dispatched
                        self.phase = if self.do_update(ctx, host)? {
                            UpdatePhase::Process2
                        } else {
                            UpdatePhase::Done
                        };
                        self.has_pending_draw = true;
                        did_update = true;
                    }
                }
            }
            UpdatePhase::Process2 => {
                self.phase = UpdatePhase::Done;

                self.pending_updates += per_draw - 1.0;
                while self.pending_updates >= 1.0 {
                    self.process_demo(ctx, host)?;
                    self.non_draw_count += 1;
                    if !self.do_update(ctx, host)? {
                        break;
                    }
                    self.pending_updates -= 1.0;
                }
                self.update_fractional(ctx, host, per_draw);

                // Vsynced pacing drops a little extra so ticks stay just after refreshes
                let spent = if vsynced { frame_ms + 0.2 } else { frame_ms };
                self.accumulator_ms = (self.accumulator_ms - spent).max(0.0);
                if self.relax_ms > 0.0 {
                    self.accumulator_ms = 0.0;
                }
                did_update = true;
            }
            UpdatePhase::Messages | UpdatePhase::Done => {}
        }

        if !did_update {
            self.phase = UpdatePhase::Done;
            self.non_draw_count = 0;

            if self.has_pending_draw {
                self.draw(ctx, host)?;
            } else {
                let wait = (frame_ms - self.accumulator_ms).ceil() as i64;
                if wait > 0 {
                    if !allow_sleep {
                        return Ok(false);
                    }
                    self.sleep(wait as u64);
                    slept_ms += wait;
                }
            }
        }

        // Leave the loader most of the CPU
        if !self.loaded && ctx.loading.in_progress() {
            let elapsed = self.clock.now_ms().saturating_sub(start) as i64 - slept_ms;
            let yield_ms = (elapsed * 2 - slept_ms).min(MAX_LOADING_YIELD_MS);
            if yield_ms >= 0 {
                if !allow_sleep {
                    return Ok(false);
                }
                self.sleep(yield_ms as u64);
            }
        }

        Ok(true)
    }

    /// Deliver one live OS event; false if none was pending
    fn process_message<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<bool> {
        let Some(event) = host.poll_event() else {
            return Ok(false);
        };

        if ctx.demo.is_replaying() {
            // Replay ignores live input except a request to stop
            if event == InputEvent::Close {
                ctx.demo.begin_shutdown();
                ctx.request_shutdown();
            }
            return Ok(true);
        }

        let event = ctx.demo.normalize_input(event);
        if let Some(catch_up) = ctx.demo.pointer_catch_up(&event) {
            ctx.demo.record_input(&catch_up);
            host.dispatch(ctx, catch_up)?;
        }
        ctx.demo.record_input(&event);
        if event == InputEvent::Close {
            ctx.request_shutdown();
        }
        host.dispatch(ctx, event)?;
        Ok(true)
    }

    /// Advance the state machine by one phase
    ///
    /// Returns whether the tick counter moved.
    pub fn step<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<bool> {
        if self.phase == UpdatePhase::Done {
            self.phase = UpdatePhase::Messages;
        }

        if self.phase == UpdatePhase::Messages {
            self.process_demo(ctx, host)?;
            if !self.process_message(ctx, host)? {
                self.phase = UpdatePhase::Process1;
            }
            return Ok(false);
        }

        let before = ctx.demo.update_count();
        if self.control.is_paused() {
            if self.control.take_step() {
                self.do_update(ctx, host)?;
                self.update_fractional(ctx, host, 1.0);
                self.draw(ctx, host)?;
            } else {
                self.sleep(u64::from(self.timing.frame_time_ms));
            }
            self.phase = UpdatePhase::Done;
        } else {
            self.process(ctx, host, true)?;
        }
        Ok(ctx.demo.update_count() != before)
    }

    /// Step until a tick happens; false once shutdown is requested
    pub fn update_app<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<bool> {
        while !ctx.is_shutdown() {
            if self.step(ctx, host)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Drive the host until shutdown
    pub fn run<H: Host + ?Sized>(&mut self, ctx: &mut AppContext, host: &mut H) -> Result<RunStats> {
        let start = self.clock.now_ms();
        self.sync_video_mode(ctx);
        self.clear_update_backlog(false);

        while self.update_app(ctx, host)? {}

        self.stats.elapsed_ms = self.clock.now_ms().saturating_sub(start);
        tracing::info!("Run finished: {}", self.stats);
        Ok(self.stats.clone())
    }
}
