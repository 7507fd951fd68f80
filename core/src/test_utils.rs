//! Shared test utilities for integration and unit tests

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;

use crate::config::TimingConfig;
use crate::context::AppContext;
use crate::demo::{DemoChannel, DemoFile, InputEvent};
use crate::host::Host;
use crate::proxy::{FileBackend, MemoryRegistry, SideEffectProxy};
use crate::scheduler::{ManualClock, Scheduler};

/// Seed used by recorded test sessions
pub const TEST_SEED: u32 = 0x5EED;

// ============================================================================
// File backend
// ============================================================================

/// In-memory file backend that counts every call
#[derive(Debug, Default)]
pub struct CountingFiles {
    files: HashMap<PathBuf, Vec<u8>>,
    calls: Arc<AtomicUsize>,
}

impl CountingFiles {
    pub fn with_file(mut self, path: impl Into<PathBuf>, data: &[u8]) -> Self {
        self.files.insert(path.into(), data.to_vec());
        self
    }

    /// Shared call counter, valid after the backend moves into a proxy
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl FileBackend for CountingFiles {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.hit();
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.hit();
        self.files.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.hit();
        self.files.contains_key(path)
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        self.hit();
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

// ============================================================================
// Scripted host
// ============================================================================

/// Host that replays a fixed event script and logs what the scheduler does
///
/// Each scripted event is delivered by `poll_event` once the simulation has
/// reached its tick. Every update draws one random number so divergence in
/// RNG usage shows up in `rng_draws`.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    script: VecDeque<(u32, InputEvent)>,
    /// File read through the context when a given key goes down
    read_on_key: Option<(u8, String)>,
    tick: u32,
    ticks_since_draw: u32,

    /// Events delivered through `dispatch`, with the tick they arrived on
    pub dispatched: Vec<(u32, InputEvent)>,
    pub rng_draws: Vec<u32>,
    pub updates: u32,
    pub draws: u32,
    pub max_ticks_without_draw: u32,
    pub muted: bool,
    pub mute_changes: u32,
    pub loading_completed_at: Option<u32>,
    /// File read through the context when loading completes
    pub read_on_load: Option<String>,
    /// Bytes returned by that read
    pub loaded_data: Option<Vec<u8>>,
    pub read_results: Vec<(u32, Option<Vec<u8>>)>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<(u32, InputEvent)>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Read `path` through the context right after `key` is dispatched
    pub fn read_on_key(mut self, key: u8, path: &str) -> Self {
        self.read_on_key = Some((key, path.to_string()));
        self
    }
}

impl Host for ScriptedHost {
    fn poll_event(&mut self) -> Option<InputEvent> {
        match self.script.front() {
            Some(&(tick, _)) if tick <= self.tick => self.script.pop_front().map(|(_, e)| e),
            _ => None,
        }
    }

    fn dispatch(&mut self, ctx: &mut AppContext, event: InputEvent) -> Result<()> {
        self.dispatched.push((ctx.demo.update_count(), event));

        let path = match (&self.read_on_key, event) {
            (Some((key, path)), InputEvent::KeyDown(code)) if *key == code => Some(path.clone()),
            _ => None,
        };
        if let Some(path) = path {
            let data = ctx.read_file(&path)?;
            self.read_results.push((ctx.demo.update_count(), data));
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut AppContext) -> Result<()> {
        self.tick = ctx.demo.update_count();
        self.updates += 1;
        self.ticks_since_draw += 1;
        self.max_ticks_without_draw = self.max_ticks_without_draw.max(self.ticks_since_draw);
        let draw = ctx.random();
        self.rng_draws.push(draw);
        Ok(())
    }

    fn draw(&mut self, _ctx: &mut AppContext) -> Result<bool> {
        self.draws += 1;
        self.ticks_since_draw = 0;
        Ok(true)
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.mute_changes += 1;
    }

    fn loading_completed(&mut self, ctx: &mut AppContext) -> Result<()> {
        self.loading_completed_at = Some(ctx.demo.update_count());
        if let Some(path) = self.read_on_load.clone() {
            self.loaded_data = ctx.read_file(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Record a session driven by `host` on a manual clock
///
/// The host's script should end with a [`InputEvent::Close`] or the run never
/// stops. Returns the demo and the host that saw the live run.
pub fn record_with(mut host: ScriptedHost, io: SideEffectProxy) -> (DemoFile, ScriptedHost) {
    let mut sched = Scheduler::new(ManualClock::new(), &TimingConfig::default());
    let mut ctx = AppContext::new(DemoChannel::recording(TEST_SEED, "test"), io);
    sched.run(&mut ctx, &mut host).unwrap();
    (ctx.demo.to_demo_file(), host)
}

pub fn record_session(script: Vec<(u32, InputEvent)>) -> (DemoFile, ScriptedHost) {
    record_with(ScriptedHost::with_script(script), SideEffectProxy::in_memory(""))
}

/// Replay `file` on a manual clock
///
/// Returns the replaying host, the final context, and how many times the
/// file backend was touched.
pub fn replay_with(file: DemoFile, mut host: ScriptedHost) -> (ScriptedHost, AppContext, usize) {
    let files = CountingFiles::default();
    let calls = files.calls();
    let io = SideEffectProxy::new(files, MemoryRegistry::new(), "");

    let mut sched = Scheduler::new(ManualClock::new(), &TimingConfig::default());
    let mut ctx = AppContext::replaying(file, io);
    sched.run(&mut ctx, &mut host).unwrap();
    (host, ctx, calls.load(Ordering::SeqCst))
}
