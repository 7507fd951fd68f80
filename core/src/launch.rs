//! Legacy launch parameters
//!
//! Hosts accept a single command-line string of `-name` / `-name=value`
//! tokens separated by spaces, with double quotes grouping values that
//! contain spaces:
//!
//! ```text
//! -play -demofile="game demo.dmo"
//! -recnum=3
//! ```
//!
//! Parameters are applied left to right, so later ones override earlier ones.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::demo::DemoRotation;

/// Errors from parsing or resolving launch parameters
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("unknown launch parameter '{0}'")]
    UnknownParam(String),

    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: String, value: String },

    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("no recordings found in {}", .0.display())]
    NoRecordings(PathBuf),

    #[error("recording {number} does not exist in {}", .dir.display())]
    MissingRecording { number: u32, dir: PathBuf },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Split a command line into `(name, value)` pairs
///
/// A closing quote ends the current token. The first `=` outside quotes
/// switches from name to value; later ones are part of the value.
pub fn tokenize(cmdline: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut name = String::new();
    let mut value = String::new();
    let mut in_quote = false;
    let mut on_value = false;

    let mut finish = |name: &mut String, value: &mut String, on_value: &mut bool| {
        if !name.is_empty() {
            params.push((std::mem::take(name), std::mem::take(value)));
        }
        name.clear();
        value.clear();
        *on_value = false;
    };

    for c in cmdline.chars() {
        match c {
            '"' => {
                in_quote = !in_quote;
                if !in_quote {
                    finish(&mut name, &mut value, &mut on_value);
                }
            }
            ' ' if !in_quote => finish(&mut name, &mut value, &mut on_value),
            '=' if !on_value && !in_quote => on_value = true,
            _ if on_value => value.push(c),
            _ => name.push(c),
        }
    }
    finish(&mut name, &mut value, &mut on_value);
    params
}

/// A recognised launch parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchParam {
    /// `-play`
    Play,
    /// `-record`
    Record,
    /// `-recnum=N`: record into the next numbered file, keeping at most N
    RecNum(u32),
    /// `-playnum=N`: play the Nth most recent numbered recording
    PlayNum(u32),
    /// `-demofile=PATH`
    DemoFile(PathBuf),
}

impl LaunchParam {
    pub fn parse(name: &str, value: &str) -> Result<Self, LaunchError> {
        match name {
            "-play" => Ok(Self::Play),
            "-record" => Ok(Self::Record),
            "-recnum" => Ok(Self::RecNum(parse_count(name, value)?)),
            "-playnum" => Ok(Self::PlayNum(parse_count(name, value)?)),
            "-demofile" if value.is_empty() => Err(LaunchError::MissingValue(name.into())),
            "-demofile" => Ok(Self::DemoFile(PathBuf::from(value))),
            _ => Err(LaunchError::UnknownParam(name.into())),
        }
    }
}

/// Empty means "use the default" (0)
fn parse_count(name: &str, value: &str) -> Result<u32, LaunchError> {
    if value.is_empty() {
        return Ok(0);
    }
    value.parse().map_err(|_| LaunchError::InvalidValue {
        name: name.into(),
        value: value.into(),
    })
}

/// Whether the session records, replays or just runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    #[default]
    Live,
    Record,
    Play,
}

/// Where the demo file comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DemoTarget {
    /// `{prefix}.dmo` in the demo directory
    #[default]
    Default,
    Path(PathBuf),
    /// Next numbered recording, keeping at most `keep` (0 for the configured limit)
    Rotate { keep: u32 },
    /// `back`-th most recent numbered recording
    Latest { back: u32 },
}

/// Parsed launch parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchOptions {
    pub mode: LaunchMode,
    pub target: DemoTarget,
}

impl LaunchOptions {
    /// Parse a legacy command-line string
    pub fn parse(cmdline: &str) -> Result<Self, LaunchError> {
        let mut options = Self::default();
        for (name, value) in tokenize(cmdline) {
            options.apply(LaunchParam::parse(&name, &value)?);
        }
        Ok(options)
    }

    pub fn apply(&mut self, param: LaunchParam) {
        match param {
            LaunchParam::Play => self.mode = LaunchMode::Play,
            LaunchParam::Record => self.mode = LaunchMode::Record,
            LaunchParam::RecNum(keep) => {
                self.mode = LaunchMode::Record;
                self.target = DemoTarget::Rotate { keep };
            }
            LaunchParam::PlayNum(back) => {
                self.mode = LaunchMode::Play;
                self.target = DemoTarget::Latest { back: back.max(1) };
            }
            LaunchParam::DemoFile(path) => self.target = DemoTarget::Path(path),
        }
    }

    /// Demo file to record to or replay from; `None` for a live session
    ///
    /// Rotating recordings prunes the oldest numbered files.
    pub fn resolve(&self, rotation: &DemoRotation) -> Result<Option<PathBuf>, LaunchError> {
        if self.mode == LaunchMode::Live {
            return Ok(None);
        }

        let path = match &self.target {
            DemoTarget::Default => rotation.default_path(),
            DemoTarget::Path(path) => resolve_relative(rotation.dir(), path),
            DemoTarget::Rotate { keep } => rotation.next_recording(*keep)?,
            DemoTarget::Latest { back } => {
                let path = rotation
                    .nth_latest(*back)?
                    .ok_or_else(|| LaunchError::NoRecordings(rotation.dir().to_path_buf()))?;
                if !path.exists() {
                    return Err(LaunchError::MissingRecording {
                        number: *back,
                        dir: rotation.dir().to_path_buf(),
                    });
                }
                path
            }
        };
        Ok(Some(path))
    }
}

/// Bare file names land in the demo directory
fn resolve_relative(dir: &Path, path: &Path) -> PathBuf {
    if path.components().count() == 1 && path.is_relative() {
        dir.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    // =============================================================
    // Tokenizer
    // =============================================================

    #[test]
    fn test_tokenize_quoted_value() {
        assert_eq!(
            tokenize(r#"-play -demofile="game demo.dmo""#),
            vec![pair("-play", ""), pair("-demofile", "game demo.dmo")]
        );
    }

    #[test]
    fn test_tokenize_extra_spaces_and_trailing_value() {
        assert_eq!(
            tokenize("  -recnum=3   -record "),
            vec![pair("-recnum", "3"), pair("-record", "")]
        );
        assert_eq!(tokenize("-playnum=2"), vec![pair("-playnum", "2")]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_equals_inside_value() {
        assert_eq!(tokenize("-demofile=a=b.dmo"), vec![pair("-demofile", "a=b.dmo")]);
        assert_eq!(tokenize(r#"-demofile="x=y z""#), vec![pair("-demofile", "x=y z")]);
    }

    #[test]
    fn test_tokenize_unterminated_quote() {
        assert_eq!(tokenize(r#"-demofile="open end"#), vec![pair("-demofile", "open end")]);
    }

    // =============================================================
    // Parameters
    // =============================================================

    #[test]
    fn test_parse_modes() {
        assert_eq!(LaunchOptions::parse("").unwrap().mode, LaunchMode::Live);
        assert_eq!(LaunchOptions::parse("-record").unwrap().mode, LaunchMode::Record);
        let options = LaunchOptions::parse("-record -play").unwrap();
        assert_eq!(options.mode, LaunchMode::Play);
        assert_eq!(options.target, DemoTarget::Default);
    }

    #[test]
    fn test_parse_numbers() {
        let options = LaunchOptions::parse("-recnum").unwrap();
        assert_eq!(options.target, DemoTarget::Rotate { keep: 0 });
        let options = LaunchOptions::parse("-playnum=0").unwrap();
        assert_eq!(options.target, DemoTarget::Latest { back: 1 });
        assert_eq!(options.mode, LaunchMode::Play);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            LaunchOptions::parse("-fullscreen"),
            Err(LaunchError::UnknownParam(name)) if name == "-fullscreen"
        ));
        assert!(matches!(
            LaunchOptions::parse("-recnum=lots"),
            Err(LaunchError::InvalidValue { .. })
        ));
        assert!(matches!(
            LaunchOptions::parse("-demofile"),
            Err(LaunchError::MissingValue(_))
        ));
    }

    // =============================================================
    // Resolution
    // =============================================================

    #[test]
    fn test_resolve_paths() {
        let dir = tempfile::tempdir().unwrap();
        let rotation = DemoRotation::new(dir.path(), "demo");

        assert_eq!(LaunchOptions::parse("").unwrap().resolve(&rotation).unwrap(), None);
        assert_eq!(
            LaunchOptions::parse("-record").unwrap().resolve(&rotation).unwrap(),
            Some(dir.path().join("demo.dmo"))
        );
        assert_eq!(
            LaunchOptions::parse("-play -demofile=run.dmo")
                .unwrap()
                .resolve(&rotation)
                .unwrap(),
            Some(dir.path().join("run.dmo"))
        );
        let absolute = dir.path().join("elsewhere").join("x.dmo");
        let options = LaunchOptions {
            mode: LaunchMode::Play,
            target: DemoTarget::Path(absolute.clone()),
        };
        assert_eq!(options.resolve(&rotation).unwrap(), Some(absolute));
    }

    #[test]
    fn test_resolve_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let rotation = DemoRotation::new(dir.path(), "demo");

        let err = LaunchOptions::parse("-playnum=1").unwrap().resolve(&rotation);
        assert!(matches!(err, Err(LaunchError::NoRecordings(_))));

        for n in 1..=3 {
            std::fs::write(rotation.path_for(n), b"x").unwrap();
        }
        let record = LaunchOptions::parse("-recnum=2").unwrap();
        assert_eq!(record.resolve(&rotation).unwrap(), Some(rotation.path_for(4)));
        assert_eq!(rotation.numbers().unwrap(), vec![3]);

        let play = LaunchOptions::parse("-playnum=1").unwrap();
        assert_eq!(play.resolve(&rotation).unwrap(), Some(rotation.path_for(3)));
        let missing = LaunchOptions::parse("-playnum=2").unwrap();
        assert!(matches!(
            missing.resolve(&rotation),
            Err(LaunchError::MissingRecording { number: 2, .. })
        ));
    }
}
