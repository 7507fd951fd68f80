//! Error types for demo recording and playback

use std::path::PathBuf;

use thiserror::Error;

/// Failure reading from a [`BitBuffer`](crate::bits::BitBuffer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// A read asked for more bits than were written
    #[error("read of {requested} bits past end of buffer ({remaining} bits remaining)")]
    OutOfRange { requested: u64, remaining: u64 },
}

/// Errors raised by the demo channel and demo file format.
#[derive(Debug, Error)]
pub enum DemoError {
    /// Malformed demo file (bad magic, truncated header, marker-count mismatch, ...)
    #[error("invalid demo data: {0}")]
    Format(String),

    /// Format version this build cannot read
    #[error("unsupported demo format version {0}")]
    UnsupportedVersion(u32),

    /// The demo was recorded by a different product build
    #[error("this demo file appears to be for '{recorded}', not '{running}'")]
    ProductMismatch { recorded: String, running: String },

    /// A command was consumed out of tick order or with the wrong opcode
    #[error("demo sequence error at tick {tick}: {detail}")]
    Sequence { tick: u32, detail: String },

    /// Replayed state diverged from the recorded run
    #[error("demo desync at tick {tick}: {detail}")]
    Desync { tick: u32, detail: String },

    /// The command stream ended in the middle of a command
    #[error("demo stream truncated: {0}")]
    Truncated(#[from] BufferError),

    /// Reading or writing the demo file itself failed
    #[error("demo file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps another error with the demo file it came from
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<DemoError>,
    },
}

impl DemoError {
    /// Attach the path of the demo file being loaded or saved
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        DemoError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error is a replay divergence (sequence or desync)
    ///
    /// These are the errors a tolerant [`DesyncPolicy`](crate::demo::DesyncPolicy) may skip.
    pub fn is_divergence(&self) -> bool {
        match self {
            DemoError::Sequence { .. } | DemoError::Desync { .. } => true,
            DemoError::File { source, .. } => source.is_divergence(),
            _ => false,
        }
    }
}

pub type DemoResult<T> = Result<T, DemoError>;
