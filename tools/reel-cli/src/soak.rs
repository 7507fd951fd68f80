//! Soak host - a deterministic stand-in application
//!
//! Every tick folds the RNG, any dispatched input and the outcome of a
//! randomly chosen side effect into a running checksum. The checksum is
//! asserted into the stream every [`ASSERT_INTERVAL`] ticks, so a replay that
//! diverges from its recording fails at the first interval after the split.
//!
//! While recording, input comes from a separately seeded generator; while
//! replaying, it comes only from the demo stream.

use std::time::Duration;

use anyhow::Result;
use tickreel_core::{
    AppContext, DemoRng, Host, InputEvent, LoadingTracker, ManualClock, RegistryValue, RunStats,
    Scheduler, SystemClock, TimingConfig,
};

/// Ticks between checksum assertions
pub const ASSERT_INTERVAL: u32 = 100;

/// Ticks between recorded markers
pub const MARKER_INTERVAL: u32 = 250;

/// Save slots the soak host writes to and reads from
const SLOTS: i32 = 4;

/// Pointer bounds for generated input
const SCREEN: (i32, i32) = (800, 600);

/// Generated live input, at most one event per tick
#[derive(Debug)]
struct InputGenerator {
    rng: DemoRng,
    end_tick: u32,
    pointer: (i32, i32),
    last_event_tick: Option<u32>,
    closed: bool,
}

impl InputGenerator {
    fn next(&mut self, tick: u32) -> Option<InputEvent> {
        if self.closed {
            return None;
        }
        if tick >= self.end_tick {
            self.closed = true;
            return Some(InputEvent::Close);
        }
        if self.last_event_tick == Some(tick) {
            return None;
        }
        self.last_event_tick = Some(tick);

        let (x, y) = self.pointer;
        let event = match self.rng.range(0, 12) {
            0..=3 => {
                self.pointer = (
                    (x + self.rng.range(-24, 25)).clamp(0, SCREEN.0 - 1),
                    (y + self.rng.range(-24, 25)).clamp(0, SCREEN.1 - 1),
                );
                InputEvent::MouseMove {
                    x: self.pointer.0,
                    y: self.pointer.1,
                }
            }
            4 => {
                // Occasional jump so absolute positions and pointer catch-up get exercised
                self.pointer = (self.rng.range(0, SCREEN.0), self.rng.range(0, SCREEN.1));
                InputEvent::MouseDown {
                    x: self.pointer.0,
                    y: self.pointer.1,
                    button: if self.rng.chance(1, 5) { -1 } else { 1 },
                }
            }
            5 => InputEvent::MouseUp { x, y, button: 1 },
            6 => InputEvent::KeyDown(b'A' + self.rng.range(0, 26) as u8),
            7 => InputEvent::KeyUp(b'A' + self.rng.range(0, 26) as u8),
            8 => InputEvent::KeyChar(u16::from(b'a') + self.rng.range(0, 26) as u16),
            9 => InputEvent::MouseWheel(self.rng.range(-3, 4) as i8),
            _ => return None,
        };
        Some(event)
    }
}

/// Deterministic workload for record and replay runs
#[derive(Debug)]
pub struct SoakHost {
    input: Option<InputGenerator>,
    tick: u32,
    checksum: u32,
    pub events: u32,
    pub side_effects: u32,
    pub draws: u32,
}

impl SoakHost {
    /// Live host generating input from `input_seed` until `ticks` have run
    pub fn recording(ticks: u32, input_seed: u32) -> Self {
        let mut host = Self::replaying();
        host.input = Some(InputGenerator {
            rng: DemoRng::new(input_seed),
            end_tick: ticks,
            pointer: (SCREEN.0 / 2, SCREEN.1 / 2),
            last_event_tick: None,
            closed: false,
        });
        host
    }

    /// Host whose only input is the demo stream
    pub fn replaying() -> Self {
        Self {
            input: None,
            tick: 0,
            checksum: 0x811C_9DC5,
            events: 0,
            side_effects: 0,
            draws: 0,
        }
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    fn fold(&mut self, value: u32) {
        self.checksum = (self.checksum.rotate_left(5) ^ value).wrapping_mul(0x0100_0193);
    }

    fn slot_path(slot: i32) -> String {
        format!("soak/slot{slot}.dat")
    }

    /// Perform one randomly chosen side effect through the context
    fn side_effect(&mut self, ctx: &mut AppContext, roll: i32) -> Result<()> {
        let slot = ctx.random_range(0, SLOTS);
        let path = Self::slot_path(slot);
        let outcome = match roll {
            0..=2 => {
                let data = self.checksum.to_le_bytes().repeat(1 + slot as usize);
                u32::from(ctx.write_file(&path, &data)?)
            }
            3..=5 => match ctx.read_file(&path)? {
                Some(data) => data
                    .iter()
                    .fold(data.len() as u32, |acc, &b| acc.wrapping_mul(31) ^ u32::from(b)),
                None => u32::MAX,
            },
            6 => u32::from(ctx.file_exists(&path)?),
            7 => u32::from(ctx.registry_write("Soak\\Checksum", RegistryValue::dword(self.checksum))?),
            8 => ctx
                .registry_read("Soak\\Checksum")?
                .and_then(|v| v.as_u32())
                .unwrap_or(0),
            _ => return Ok(()),
        };
        self.side_effects += 1;
        self.fold(outcome);
        Ok(())
    }
}

impl Host for SoakHost {
    fn poll_event(&mut self) -> Option<InputEvent> {
        let tick = self.tick;
        self.input.as_mut().and_then(|input| input.next(tick))
    }

    fn dispatch(&mut self, _ctx: &mut AppContext, event: InputEvent) -> Result<()> {
        self.events += 1;
        let value = match event {
            InputEvent::MouseMove { x, y } => ((x as u32) << 16) | y as u32,
            InputEvent::MouseDown { x, y, button } | InputEvent::MouseUp { x, y, button } => {
                ((x as u32) << 16) ^ (y as u32) ^ ((button as u32) << 28)
            }
            InputEvent::MouseWheel(delta) => delta as u32,
            InputEvent::KeyDown(code) => 0x1_0000 | u32::from(code),
            InputEvent::KeyUp(code) => 0x2_0000 | u32::from(code),
            InputEvent::KeyChar(ch) => 0x3_0000 | u32::from(ch),
            InputEvent::Activate(flag) | InputEvent::Minimize(flag) => 0x4_0000 | u32::from(flag),
            InputEvent::MouseEnter => 0x5_0000,
            InputEvent::MouseExit => 0x6_0000,
            InputEvent::Close => 0x7_0000,
        };
        self.fold(value);
        Ok(())
    }

    fn update(&mut self, ctx: &mut AppContext) -> Result<()> {
        self.tick = ctx.demo.update_count();
        let roll = ctx.random_range(0, 40);
        self.fold(roll as u32);
        self.side_effect(ctx, roll)?;

        if self.tick % ASSERT_INTERVAL == 0 {
            ctx.demo.assert_int_equal(self.checksum)?;
        }
        if self.tick % MARKER_INTERVAL == 0 {
            ctx.demo.add_marker(format!("t{}", self.tick));
        }
        Ok(())
    }

    fn draw(&mut self, _ctx: &mut AppContext) -> Result<bool> {
        self.draws += 1;
        Ok(true)
    }

    fn set_muted(&mut self, muted: bool) {
        tracing::debug!("Audio {}", if muted { "muted" } else { "unmuted" });
    }

    fn loading_completed(&mut self, ctx: &mut AppContext) -> Result<()> {
        self.fold(ctx.demo.update_count());
        Ok(())
    }
}

/// Start a loader that finishes `tasks` short units of work
pub fn spawn_loader(loading: &LoadingTracker, tasks: u32) -> Result<()> {
    if tasks == 0 {
        return Ok(());
    }
    loading.spawn(tasks, move |tracker| {
        for _ in 0..tasks {
            std::thread::sleep(Duration::from_millis(5));
            tracker.task_completed();
        }
        Ok(())
    })?;
    Ok(())
}

/// Run the scheduler to shutdown on the wall clock or on a manual clock
///
/// The manual clock only advances when the scheduler sleeps, so a run costs
/// no more real time than the host's own work.
pub fn drive(
    realtime: bool,
    timing: &TimingConfig,
    ctx: &mut AppContext,
    host: &mut SoakHost,
) -> Result<RunStats> {
    if realtime {
        Scheduler::new(SystemClock::new(), timing).run(ctx, host)
    } else {
        Scheduler::new(ManualClock::new(), timing).run(ctx, host)
    }
}
