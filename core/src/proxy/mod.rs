//! Replayable side effects
//!
//! [`SideEffectProxy`] wraps file and registry access. Live sessions go
//! straight to the backend. Recording sessions perform the real operation and
//! append its outcome (and payload) to the demo stream. Replaying sessions
//! never touch the backend: they return whatever was recorded, so a failed
//! read stays failed and a successful one returns the bytes seen at recording
//! time.

mod files;
mod registry;

use std::path::Path;

use crate::demo::{Command, DemoChannel, LongOpcode};
use crate::error::DemoResult;

pub use files::{DiskFiles, FileBackend};
pub use registry::{
    FileRegistry, MemoryRegistry, REG_BINARY, REG_DWORD, REG_DWORD_BIG_ENDIAN, REG_EXPAND_SZ,
    REG_MULTI_SZ, REG_NONE, REG_QWORD, REG_SZ, RegistryBackend, RegistryValue, join_key,
    split_value_name,
};

/// Key all registry paths are rooted under
const REGISTRY_BASE: &str = "SOFTWARE";

/// File and registry access that can be recorded and replayed
pub struct SideEffectProxy {
    files: Box<dyn FileBackend>,
    registry: Box<dyn RegistryBackend>,
    /// Application key under `SOFTWARE`; empty disables the registry
    registry_root: String,
}

impl std::fmt::Debug for SideEffectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffectProxy")
            .field("registry_root", &self.registry_root)
            .finish_non_exhaustive()
    }
}

impl SideEffectProxy {
    /// Proxy over the given file and registry backends
    pub fn new(
        files: impl FileBackend + 'static,
        registry: impl RegistryBackend + 'static,
        registry_root: impl Into<String>,
    ) -> Self {
        Self {
            files: Box::new(files),
            registry: Box::new(registry),
            registry_root: registry_root.into(),
        }
    }

    /// Disk files and an in-memory registry
    pub fn in_memory(registry_root: impl Into<String>) -> Self {
        Self::new(DiskFiles::new(), MemoryRegistry::new(), registry_root)
    }

    /// Application key; empty when the registry is disabled
    pub fn registry_root(&self) -> &str {
        &self.registry_root
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Read a whole file; `None` if it could not be read
    pub fn read_file(&mut self, demo: &mut DemoChannel, path: &Path) -> DemoResult<Option<Vec<u8>>> {
        if demo.is_replaying() {
            if demo.is_shutting_down() {
                return Ok(None);
            }
            return Ok(match demo.take_required(LongOpcode::FileRead)? {
                Some(Command::FileRead(result)) => result,
                _ => None,
            });
        }

        let result = match self.files.read(path) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!("Read of {} failed: {}", path.display(), e);
                None
            }
        };
        demo.record(&Command::FileRead(result.clone()));
        Ok(result)
    }

    /// Read a file without involving the demo stream
    ///
    /// For resources that are identical in every run (bundled data), so
    /// replay does not need them captured.
    pub fn read_file_unrecorded(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read(path).ok()
    }

    /// Write a whole file, creating parent directories
    pub fn write_file(&mut self, demo: &mut DemoChannel, path: &Path, data: &[u8]) -> DemoResult<bool> {
        if demo.is_replaying() {
            if demo.is_shutting_down() {
                return Ok(true);
            }
            return Ok(matches!(
                demo.take_required(LongOpcode::FileWrite)?,
                Some(Command::FileWrite { ok: true })
            ));
        }

        let ok = match self.files.write(path, data) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Write of {} failed: {}", path.display(), e);
                false
            }
        };
        demo.record(&Command::FileWrite { ok });
        Ok(ok)
    }

    /// Whether a file exists
    pub fn file_exists(&mut self, demo: &mut DemoChannel, path: &Path) -> DemoResult<bool> {
        if demo.is_replaying() {
            if demo.is_shutting_down() {
                return Ok(true);
            }
            return Ok(matches!(
                demo.take_required(LongOpcode::FileExists)?,
                Some(Command::FileExists(true))
            ));
        }

        let exists = self.files.exists(path);
        demo.record(&Command::FileExists(exists));
        Ok(exists)
    }

    /// Delete a file. Not recorded; replay reports success without deleting.
    pub fn erase_file(&mut self, demo: &DemoChannel, path: &Path) -> bool {
        if demo.is_replaying() {
            return true;
        }
        self.files.remove(path).is_ok()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    fn app_key(&self) -> String {
        join_key(REGISTRY_BASE, &self.registry_root)
    }

    /// Read `Sub\Key\ValueName` under the application key
    pub fn registry_read(
        &mut self,
        demo: &mut DemoChannel,
        value_name: &str,
    ) -> DemoResult<Option<RegistryValue>> {
        if self.registry_root.is_empty() {
            return Ok(None);
        }
        if demo.is_replaying() {
            if demo.is_shutting_down() {
                return Ok(None);
            }
            return Ok(match demo.take_required(LongOpcode::RegistryRead)? {
                Some(Command::RegistryRead(value)) => value,
                _ => None,
            });
        }

        let (key, value) = split_value_name(value_name);
        let result = self.registry.read(&join_key(&self.app_key(), key), value);
        demo.record(&Command::RegistryRead(result.clone()));
        Ok(result)
    }

    /// Write `Sub\Key\ValueName` under the application key
    pub fn registry_write(
        &mut self,
        demo: &mut DemoChannel,
        value_name: &str,
        data: RegistryValue,
    ) -> DemoResult<bool> {
        if self.registry_root.is_empty() {
            return Ok(false);
        }
        if demo.is_replaying() {
            if demo.is_shutting_down() {
                return Ok(true);
            }
            return Ok(matches!(
                demo.take_required(LongOpcode::RegistryWrite)?,
                Some(Command::RegistryWrite { ok: true })
            ));
        }

        let (key, value) = split_value_name(value_name);
        let ok = self
            .registry
            .write(&join_key(&self.app_key(), key), value, data);
        demo.record(&Command::RegistryWrite { ok });
        Ok(ok)
    }

    /// Erase a key (and everything below it) under the application key
    pub fn registry_erase_key(&mut self, demo: &mut DemoChannel, key_name: &str) -> DemoResult<bool> {
        if self.registry_root.is_empty() {
            return Ok(false);
        }
        if demo.is_replaying() {
            if demo.is_shutting_down() {
                return Ok(true);
            }
            return Ok(matches!(
                demo.take_required(LongOpcode::RegistryErase)?,
                Some(Command::RegistryErase { ok: true })
            ));
        }

        let ok = self.registry.erase_key(&join_key(&self.app_key(), key_name));
        demo.record(&Command::RegistryErase { ok });
        Ok(ok)
    }

    /// Child key names of a key under the application key
    pub fn registry_subkeys(
        &mut self,
        demo: &mut DemoChannel,
        key_name: &str,
    ) -> DemoResult<Option<Vec<String>>> {
        if self.registry_root.is_empty() {
            return Ok(None);
        }
        if demo.is_replaying() {
            if demo.is_shutting_down() {
                return Ok(Some(Vec::new()));
            }
            return Ok(match demo.take_required(LongOpcode::RegistrySubkeys)? {
                Some(Command::RegistrySubkeys(keys)) => keys,
                _ => None,
            });
        }

        let result = self.registry.subkeys(&join_key(&self.app_key(), key_name));
        demo.record(&Command::RegistrySubkeys(result.clone()));
        Ok(result)
    }

    /// Value read as a string
    pub fn registry_read_string(
        &mut self,
        demo: &mut DemoChannel,
        value_name: &str,
    ) -> DemoResult<Option<String>> {
        Ok(self
            .registry_read(demo, value_name)?
            .and_then(|value| value.as_string()))
    }

    /// Value read as a DWORD
    pub fn registry_read_int(&mut self, demo: &mut DemoChannel, value_name: &str) -> DemoResult<Option<u32>> {
        Ok(self
            .registry_read(demo, value_name)?
            .and_then(|value| value.as_u32()))
    }

    /// DWORD value read as a flag
    pub fn registry_read_bool(&mut self, demo: &mut DemoChannel, value_name: &str) -> DemoResult<Option<bool>> {
        Ok(self.registry_read_int(demo, value_name)?.map(|v| v != 0))
    }

    /// Store a string value
    pub fn registry_write_string(
        &mut self,
        demo: &mut DemoChannel,
        value_name: &str,
        value: &str,
    ) -> DemoResult<bool> {
        self.registry_write(demo, value_name, RegistryValue::string(value))
    }

    /// Store a DWORD value
    pub fn registry_write_int(&mut self, demo: &mut DemoChannel, value_name: &str, value: u32) -> DemoResult<bool> {
        self.registry_write(demo, value_name, RegistryValue::dword(value))
    }

    /// Store a flag as a DWORD
    pub fn registry_write_bool(&mut self, demo: &mut DemoChannel, value_name: &str, value: bool) -> DemoResult<bool> {
        self.registry_write_int(demo, value_name, u32::from(value))
    }
}
