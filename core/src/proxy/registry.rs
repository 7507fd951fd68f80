//! Emulated key/value registry
//!
//! Keys are backslash-separated paths (`SOFTWARE\Vendor\Game\Profiles`), each
//! holding named typed values. Writing a value creates its key; a key with
//! descendants exists even if it holds no values itself.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// No value type
pub const REG_NONE: u32 = 0;
/// UTF-8 string
pub const REG_SZ: u32 = 1;
/// String with unexpanded environment references
pub const REG_EXPAND_SZ: u32 = 2;
/// Raw bytes
pub const REG_BINARY: u32 = 3;
/// Little-endian u32
pub const REG_DWORD: u32 = 4;
/// Big-endian u32
pub const REG_DWORD_BIG_ENDIAN: u32 = 5;
/// NUL-separated string list
pub const REG_MULTI_SZ: u32 = 7;
/// Little-endian u64
pub const REG_QWORD: u32 = 11;

/// One typed registry value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryValue {
    pub kind: u32,
    pub data: Vec<u8>,
}

impl RegistryValue {
    pub fn string(value: &str) -> Self {
        Self {
            kind: REG_SZ,
            data: value.as_bytes().to_vec(),
        }
    }

    pub fn dword(value: u32) -> Self {
        Self {
            kind: REG_DWORD,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: REG_BINARY,
            data: data.into(),
        }
    }

    /// String contents, for string-typed values (trailing NULs dropped)
    pub fn as_string(&self) -> Option<String> {
        if self.kind != REG_SZ && self.kind != REG_EXPAND_SZ {
            return None;
        }
        let end = self
            .data
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        Some(String::from_utf8_lossy(&self.data[..end]).into_owned())
    }

    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.data.as_slice().try_into().ok()?;
        match self.kind {
            REG_DWORD => Some(u32::from_le_bytes(bytes)),
            REG_DWORD_BIG_ENDIAN => Some(u32::from_be_bytes(bytes)),
            _ => None,
        }
    }
}

/// Split `Profiles\Alice\Level` into (`Profiles\Alice`, `Level`)
pub fn split_value_name(name: &str) -> (&str, &str) {
    match name.rfind('\\') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => ("", name),
    }
}

/// Join two key path fragments with a single backslash
pub fn join_key(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('\\');
    let child = child.trim_matches('\\');
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}\\{child}"),
    }
}

/// Real registry operations the proxy wraps
pub trait RegistryBackend: Send {
    fn read(&self, key: &str, value: &str) -> Option<RegistryValue>;

    fn write(&mut self, key: &str, value: &str, data: RegistryValue) -> bool;

    /// Remove a key with all its values and descendants
    fn erase_key(&mut self, key: &str) -> bool;

    /// Immediate child key names, or `None` if the key does not exist
    fn subkeys(&self, key: &str) -> Option<Vec<String>>;
}

/// In-memory registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegistry {
    #[serde(default)]
    keys: BTreeMap<String, BTreeMap<String, RegistryValue>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_exists(&self, key: &str) -> bool {
        let prefix = format!("{key}\\");
        self.keys.contains_key(key) || self.keys.keys().any(|k| k.starts_with(&prefix))
    }
}

impl RegistryBackend for MemoryRegistry {
    fn read(&self, key: &str, value: &str) -> Option<RegistryValue> {
        self.keys.get(key)?.get(value).cloned()
    }

    fn write(&mut self, key: &str, value: &str, data: RegistryValue) -> bool {
        self.keys
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string(), data);
        true
    }

    fn erase_key(&mut self, key: &str) -> bool {
        if !self.key_exists(key) {
            return false;
        }
        let prefix = format!("{key}\\");
        self.keys.retain(|k, _| k != key && !k.starts_with(&prefix));
        true
    }

    fn subkeys(&self, key: &str) -> Option<Vec<String>> {
        if !self.key_exists(key) {
            return None;
        }
        let prefix = format!("{key}\\");
        let children: BTreeSet<&str> = self
            .keys
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('\\').next())
            .filter(|name| !name.is_empty())
            .collect();
        Some(children.into_iter().map(str::to_string).collect())
    }
}

/// Registry persisted as a TOML file, rewritten after every mutation
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    inner: MemoryRegistry,
}

impl FileRegistry {
    /// Open (or start empty if missing or unreadable) the registry at `path`
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| match toml::from_str(&content) {
                Ok(registry) => Some(registry),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable registry {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();
        Self { path, inner }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> bool {
        let result = toml::to_string_pretty(&self.inner)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .and_then(|content| {
                if let Some(parent) = self.path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.path, content)
            });
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to save registry {}: {}", self.path.display(), e);
                false
            }
        }
    }
}

impl RegistryBackend for FileRegistry {
    fn read(&self, key: &str, value: &str) -> Option<RegistryValue> {
        self.inner.read(key, value)
    }

    fn write(&mut self, key: &str, value: &str, data: RegistryValue) -> bool {
        self.inner.write(key, value, data) && self.persist()
    }

    fn erase_key(&mut self, key: &str) -> bool {
        self.inner.erase_key(key) && self.persist()
    }

    fn subkeys(&self, key: &str) -> Option<Vec<String>> {
        self.inner.subkeys(key)
    }
}
