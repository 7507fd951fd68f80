//! File backends for the side-effect proxy

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Real file operations the proxy wraps
///
/// Implementations report failures; they never retry.
pub trait FileBackend: Send {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write `data`, creating parent directories as needed
    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn remove(&mut self, path: &Path) -> io::Result<()>;
}

/// Files on disk, with relative paths resolved against an optional base directory
#[derive(Debug, Clone, Default)]
pub struct DiskFiles {
    base: Option<PathBuf>,
}

impl DiskFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `base`
    pub fn rooted(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl FileBackend for DiskFiles {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        let path = self.resolve(path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.resolve(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = DiskFiles::rooted(dir.path());

        files.write(Path::new("saves/slot1/state.dat"), b"abc").unwrap();
        assert!(files.exists(Path::new("saves/slot1/state.dat")));
        assert_eq!(files.read(Path::new("saves/slot1/state.dat")).unwrap(), b"abc");
        assert!(dir.path().join("saves/slot1/state.dat").is_file());
    }

    #[test]
    fn test_remove_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = DiskFiles::rooted(dir.path());
        files.write(Path::new("a.txt"), b"1").unwrap();

        files.remove(Path::new("a.txt")).unwrap();
        assert!(!files.exists(Path::new("a.txt")));
        assert!(files.read(Path::new("a.txt")).is_err());
        assert!(files.remove(Path::new("a.txt")).is_err());
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = DiskFiles::new();
        assert!(!files.exists(dir.path()));
    }
}
