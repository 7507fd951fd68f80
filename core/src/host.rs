//! Host trait
//!
//! The host is everything outside the record/replay core: the window and its
//! event queue, the simulation, the renderer and audio. The scheduler drives
//! it through this trait and hands it the [`AppContext`] on every call, so
//! the simulation reaches the demo channel, RNG and side-effect proxy without
//! any global state.

use anyhow::Result;

use crate::context::AppContext;
use crate::demo::InputEvent;

/// Display, input, and simulation provider driven by the scheduler
pub trait Host {
    /// Next pending OS event, if any
    ///
    /// Not called during replay except to notice a user close request.
    fn poll_event(&mut self) -> Option<InputEvent>;

    /// Deliver an event to the UI root
    ///
    /// Live events arrive here after being recorded; replayed events arrive
    /// at the tick they were recorded on.
    fn dispatch(&mut self, ctx: &mut AppContext, event: InputEvent) -> Result<()>;

    /// Advance the simulation by one tick
    fn update(&mut self, ctx: &mut AppContext) -> Result<()>;

    /// Interpolation step between ticks when pacing off the display refresh
    ///
    /// `fraction` is the number of ticks this draw represents.
    fn update_fractional(&mut self, _ctx: &mut AppContext, _fraction: f64) {}

    /// Render one frame
    ///
    /// Returns false when nothing needed drawing.
    fn draw(&mut self, ctx: &mut AppContext) -> Result<bool>;

    /// Silence audio while a replay fast-forwards
    fn set_muted(&mut self, _muted: bool) {}

    /// The loading thread finished and the simulation may leave its loading state
    fn loading_completed(&mut self, _ctx: &mut AppContext) -> Result<()> {
        Ok(())
    }
}
