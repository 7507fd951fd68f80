//! Demo recording and playback
//!
//! A demo is a bit-packed command stream plus a small header. Recording
//! captures every input event and every side-effect outcome together with the
//! tick it happened on; replay feeds them back at the same ticks so the
//! simulation reaches the same states.
//!
//! - [`BitBuffer`](crate::bits::BitBuffer) - bit-level storage
//! - [`Command`] - the command vocabulary and its encoding
//! - [`DemoChannel`] - record/replay state machine
//! - [`DemoFile`] - on-disk container
//! - [`DemoRotation`] - numbered recordings

pub mod channel;
pub mod command;
pub mod file;
pub mod input;
pub mod rotation;

pub use channel::{DemoChannel, DemoMode, DesyncPolicy, FastForward, VideoMode};
pub use command::{Command, LongOpcode, Opcode, ShortOpcode};
pub use file::{DEMO_MAGIC, DEMO_VERSION, DemoFile, Marker};
pub use input::InputEvent;
pub use rotation::DemoRotation;
