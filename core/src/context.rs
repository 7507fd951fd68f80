//! Per-session application context
//!
//! One [`AppContext`] is built at startup and passed by `&mut` to the
//! scheduler and every host callback. It owns the demo channel, the seeded
//! RNG, the side-effect proxy and the loading tracker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::config::Config;
use crate::demo::{Command, DemoChannel, DemoFile, DemoRotation};
use crate::error::DemoResult;
use crate::launch::{DemoTarget, LaunchMode, LaunchOptions};
use crate::proxy::{DiskFiles, FileRegistry, MemoryRegistry, RegistryValue, SideEffectProxy};
use crate::rng::DemoRng;
use crate::scheduler::LoadingTracker;

#[derive(Debug)]
pub struct AppContext {
    pub demo: DemoChannel,
    pub rng: DemoRng,
    pub io: SideEffectProxy,
    pub loading: LoadingTracker,
    /// Where a recording is saved, or where a replay came from
    demo_path: Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
}

impl AppContext {
    /// Context around an existing channel; the RNG takes the channel's seed
    pub fn new(demo: DemoChannel, io: SideEffectProxy) -> Self {
        Self {
            rng: DemoRng::new(demo.rng_seed()),
            demo,
            io,
            loading: LoadingTracker::new(),
            demo_path: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Live session with a fresh seed
    pub fn live(io: SideEffectProxy) -> Self {
        Self::new(DemoChannel::idle(DemoRng::fresh_seed()), io)
    }

    /// New recording with a fresh seed
    pub fn recording(product_version: &str, io: SideEffectProxy) -> Self {
        Self::new(DemoChannel::recording(DemoRng::fresh_seed(), product_version), io)
    }

    /// Replay of a loaded demo
    pub fn replaying(file: DemoFile, io: SideEffectProxy) -> Self {
        Self::new(DemoChannel::replaying(file), io)
    }

    /// Build the session described by launch parameters
    ///
    /// A demo that cannot be loaded, or that was recorded by another product
    /// version, is an error.
    pub fn from_launch(options: &LaunchOptions, config: &Config, io: SideEffectProxy) -> Result<Self> {
        let rotation = DemoRotation::new(config.demo.resolved_directory(), &config.demo.prefix);
        let mut options = options.clone();
        if let DemoTarget::Rotate { keep } = &mut options.target
            && *keep == 0
        {
            *keep = config.demo.keep_recordings;
        }
        let path = options.resolve(&rotation)?;

        let mut ctx = match (options.mode, path) {
            (LaunchMode::Play, Some(path)) => {
                let file = DemoFile::load(&path)?;
                file.check_product(&config.demo.product_version)
                    .map_err(|e| e.in_file(&path))?;
                let mut ctx = Self::replaying(file, io);
                ctx.demo_path = Some(path);
                ctx
            }
            (LaunchMode::Record, Some(path)) => {
                let mut ctx = Self::recording(&config.demo.product_version, io);
                tracing::info!("Recording to {}", path.display());
                ctx.demo_path = Some(path);
                ctx
            }
            _ => Self::live(io),
        };
        ctx.demo.set_policy(config.demo.desync_policy);
        Ok(ctx)
    }

    /// Set where `finish` saves the recording
    pub fn with_demo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.demo_path = Some(path.into());
        self
    }

    /// Recording target, or the demo being replayed
    pub fn demo_path(&self) -> Option<&Path> {
        self.demo_path.as_deref()
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Ask the scheduler to stop after the current step
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Flag another thread (a signal handler, say) can set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Wait for the loader and save the recording, if any
    ///
    /// Returns the path the recording was written to.
    pub fn finish(&mut self) -> DemoResult<Option<PathBuf>> {
        self.loading.wait();

        if !self.demo.is_recording() {
            return Ok(None);
        }
        let Some(path) = self.demo_path.clone() else {
            return Ok(None);
        };
        // An empty stream does not load
        if self.demo.stream_len() == 0 {
            self.demo.record(&Command::Idle);
        }
        let file = self.demo.to_demo_file();
        file.save(&path)?;
        tracing::info!(
            "Saved {} ticks ({} stream bytes) to {}",
            file.total_ticks,
            file.stream.len(),
            path.display()
        );
        Ok(Some(path))
    }

    // ------------------------------------------------------------------
    // Random numbers
    // ------------------------------------------------------------------

    /// Next deterministic random number
    pub fn random(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Deterministic random number in `low..high`
    pub fn random_range(&mut self, low: i32, high: i32) -> i32 {
        self.rng.range(low, high)
    }

    // ------------------------------------------------------------------
    // Side effects
    // ------------------------------------------------------------------

    /// Read a whole file through the recorded proxy
    pub fn read_file(&mut self, path: impl AsRef<Path>) -> DemoResult<Option<Vec<u8>>> {
        self.io.read_file(&mut self.demo, path.as_ref())
    }

    /// Write a whole file through the recorded proxy
    pub fn write_file(&mut self, path: impl AsRef<Path>, data: &[u8]) -> DemoResult<bool> {
        self.io.write_file(&mut self.demo, path.as_ref(), data)
    }

    /// Recorded existence check
    pub fn file_exists(&mut self, path: impl AsRef<Path>) -> DemoResult<bool> {
        self.io.file_exists(&mut self.demo, path.as_ref())
    }

    /// Delete a file (not recorded)
    pub fn erase_file(&mut self, path: impl AsRef<Path>) -> bool {
        self.io.erase_file(&self.demo, path.as_ref())
    }

    /// Recorded registry value read
    pub fn registry_read(&mut self, value_name: &str) -> DemoResult<Option<RegistryValue>> {
        self.io.registry_read(&mut self.demo, value_name)
    }

    /// Recorded registry value write
    pub fn registry_write(&mut self, value_name: &str, value: RegistryValue) -> DemoResult<bool> {
        self.io.registry_write(&mut self.demo, value_name, value)
    }

    /// Recorded registry key erase
    pub fn registry_erase_key(&mut self, key_name: &str) -> DemoResult<bool> {
        self.io.registry_erase_key(&mut self.demo, key_name)
    }
}

/// Side-effect proxy for the configured registry
///
/// File access is relative to `files_root` when given.
pub fn side_effects_from_config(config: &Config, files_root: Option<&Path>) -> SideEffectProxy {
    let files = match files_root {
        Some(root) => DiskFiles::rooted(root),
        None => DiskFiles::new(),
    };
    let root = config.registry.root.clone();
    match &config.registry.file {
        Some(path) => SideEffectProxy::new(files, FileRegistry::open(path), root),
        None => SideEffectProxy::new(files, MemoryRegistry::new(), root),
    }
}
