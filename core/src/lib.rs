//! Tickreel Core - deterministic record and replay
//!
//! This crate captures every source of nondeterminism in an interactive
//! application (input events, file and registry reads, the RNG seed, the
//! point where background loading finished) into a compact demo stream, and
//! feeds it back so a replay reaches the same states tick for tick.
//!
//! # Architecture
//!
//! - [`BitBuffer`] - LSB-first bit storage for the command stream
//! - [`DemoChannel`] - Record/replay state machine over the stream
//! - [`DemoFile`] - On-disk container for a recording
//! - [`SideEffectProxy`] - File and registry access that replays recorded outcomes
//! - [`Scheduler`] - Adaptive fixed-timestep loop driving a [`Host`]
//! - [`AppContext`] - Per-session state handed to the host on every call

pub mod bits;
pub mod config;
pub mod context;
pub mod demo;
pub mod error;
pub mod host;
#[cfg(test)]
mod integration;
pub mod launch;
pub mod proxy;
pub mod rng;
pub mod scheduler;
#[cfg(test)]
pub mod test_utils;

pub use bits::BitBuffer;
pub use config::{Config, DemoConfig, RegistryConfig, TimingConfig};
pub use context::{AppContext, side_effects_from_config};
pub use error::{BufferError, DemoError, DemoResult};
pub use host::Host;
pub use launch::{DemoTarget, LaunchError, LaunchMode, LaunchOptions, LaunchParam};
pub use rng::DemoRng;

// Re-export demo types
pub use demo::{
    Command, DEMO_MAGIC, DEMO_VERSION, DemoChannel, DemoFile, DemoMode, DemoRotation,
    DesyncPolicy, FastForward, InputEvent, Marker, VideoMode,
};

// Re-export side-effect types
pub use proxy::{
    DiskFiles, FileBackend, FileRegistry, MemoryRegistry, RegistryBackend, RegistryValue,
    SideEffectProxy,
};

// Re-export scheduler types
pub use scheduler::{
    Clock, FrameControl, LoadingTracker, ManualClock, RunStats, Scheduler, SystemClock,
    UpdatePhase, VsyncMonitor,
};
