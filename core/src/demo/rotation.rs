//! Numbered recordings (`demo1.dmo`, `demo2.dmo`, ...)
//!
//! Recording picks the next number after the highest existing one and prunes
//! the oldest files so at most `keep` remain once it is saved. Playback counts
//! back from the newest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::file::DEMO_EXTENSION;

/// Default number of recordings kept by `-recnum`
pub const DEFAULT_KEEP: u32 = 5;

/// A directory of `{prefix}{n}.dmo` files
#[derive(Debug, Clone)]
pub struct DemoRotation {
    dir: PathBuf,
    prefix: String,
}

impl DemoRotation {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unnumbered `{prefix}.dmo`, used when no file or number is given
    pub fn default_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.prefix, DEMO_EXTENSION))
    }

    /// Path of recording number `n`
    pub fn path_for(&self, n: u32) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", self.prefix, n, DEMO_EXTENSION))
    }

    /// Existing recording numbers, ascending
    pub fn numbers(&self) -> io::Result<Vec<u32>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut numbers = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(n) = name.to_str().and_then(|name| self.parse_number(name)) {
                numbers.push(n);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    fn parse_number(&self, file_name: &str) -> Option<u32> {
        let stem = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(DEMO_EXTENSION)?
            .strip_suffix('.')?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok()
    }

    /// Choose the path for a new recording, deleting the oldest ones so that
    /// at most `keep` exist after it is written
    pub fn next_recording(&self, keep: u32) -> io::Result<PathBuf> {
        let keep = if keep == 0 { DEFAULT_KEEP } else { keep };
        let numbers = self.numbers()?;
        let next = numbers.last().map_or(1, |max| max + 1);

        let excess = numbers.len().saturating_sub(keep as usize - 1);
        for &old in &numbers[..excess] {
            let path = self.path_for(old);
            tracing::debug!("Removing old recording {}", path.display());
            fs::remove_file(path)?;
        }

        Ok(self.path_for(next))
    }

    /// The `back`-th most recent recording (1 = newest)
    pub fn nth_latest(&self, back: u32) -> io::Result<Option<PathBuf>> {
        let back = back.max(1) - 1;
        let Some(&max) = self.numbers()?.last() else {
            return Ok(None);
        };
        Ok(max.checked_sub(back).map(|n| self.path_for(n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(rotation: &DemoRotation, n: u32) {
        fs::write(rotation.path_for(n), b"x").unwrap();
    }

    #[test]
    fn test_first_recording_is_one() {
        let dir = tempfile::tempdir().unwrap();
        let rotation = DemoRotation::new(dir.path().join("missing"), "demo");
        assert_eq!(rotation.numbers().unwrap(), Vec::<u32>::new());
        assert_eq!(
            rotation.next_recording(5).unwrap(),
            dir.path().join("missing").join("demo1.dmo")
        );
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let rotation = DemoRotation::new(dir.path(), "demo");
        touch(&rotation, 3);
        fs::write(dir.path().join("demo.dmo"), b"").unwrap();
        fs::write(dir.path().join("demox.dmo"), b"").unwrap();
        fs::write(dir.path().join("other4.dmo"), b"").unwrap();
        fs::write(dir.path().join("demo5.txt"), b"").unwrap();

        assert_eq!(rotation.numbers().unwrap(), vec![3]);
    }

    #[test]
    fn test_rotation_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let rotation = DemoRotation::new(dir.path(), "demo");
        for n in 1..=5 {
            touch(&rotation, n);
        }

        let next = rotation.next_recording(3).unwrap();
        assert_eq!(next, rotation.path_for(6));
        // Two kept plus the one about to be written
        assert_eq!(rotation.numbers().unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_nth_latest() {
        let dir = tempfile::tempdir().unwrap();
        let rotation = DemoRotation::new(dir.path(), "demo");
        assert_eq!(rotation.nth_latest(1).unwrap(), None);

        for n in [2, 3, 4] {
            touch(&rotation, n);
        }
        assert_eq!(rotation.nth_latest(1).unwrap(), Some(rotation.path_for(4)));
        assert_eq!(rotation.nth_latest(0).unwrap(), Some(rotation.path_for(4)));
        assert_eq!(rotation.nth_latest(3).unwrap(), Some(rotation.path_for(2)));
    }
}
