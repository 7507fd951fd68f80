//! Demo file format
//!
//! Layout (little-endian):
//!
//! ```text
//! u32 magic = 0x42BEEF78
//! u32 version
//! u32 rng seed
//! u16 product version length, product version bytes
//! u32 marker block length, marker block          (version >= 2)
//! u32 total tick count
//! ... command stream bytes
//! ```
//!
//! The marker block is itself bit-buffer encoded: a 32-bit count followed by
//! (u16-prefixed label, 32-bit tick) pairs.

use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::bits::BitBuffer;
use crate::demo::command::{Command, MIN_COMMAND_BITS, TIMING_BITS};
use crate::error::{DemoError, DemoResult};

/// File identifier
pub const DEMO_MAGIC: u32 = 0x42BE_EF78;
/// Version written by this build
pub const DEMO_VERSION: u32 = 2;
/// Longest accepted product version string
pub const MAX_PRODUCT_VERSION_LEN: usize = 255;
/// Conventional file extension
pub const DEMO_EXTENSION: &str = "dmo";

/// A named point in a recording, used for scrubbing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub label: String,
    pub tick: u32,
}

/// A complete recording as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoFile {
    pub version: u32,
    pub rng_seed: u32,
    pub product_version: String,
    pub markers: Vec<Marker>,
    pub total_ticks: u32,
    pub stream: Vec<u8>,
}

impl DemoFile {
    /// Load and validate a demo file
    pub fn load(path: impl AsRef<Path>) -> DemoResult<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| DemoError::Io(e).in_file(path))?;
        Self::from_bytes(&data).map_err(|e| e.in_file(path))
    }

    /// Save to `path`, replacing it only once the new file is fully written
    pub fn save(&self, path: impl AsRef<Path>) -> DemoResult<()> {
        let path = path.as_ref();
        let result = (|| -> io::Result<()> {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("dmo.tmp");
            let mut file = io::BufWriter::new(fs::File::create(&tmp)?);
            self.write_to(&mut file)?;
            file.flush()?;
            drop(file);
            fs::rename(&tmp, path)
        })();
        result.map_err(|e| DemoError::Io(e).in_file(path))
    }

    /// Read a demo from any reader (consumes it to the end)
    pub fn read_from<R: Read>(mut reader: R) -> DemoResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> DemoResult<Self> {
        let mut cursor = Cursor::new(data);

        let magic = read_u32(&mut cursor, "magic")?;
        if magic != DEMO_MAGIC {
            return Err(DemoError::Format(format!("bad magic 0x{magic:08X}")));
        }

        let version = read_u32(&mut cursor, "version")?;
        if version == 0 || version > DEMO_VERSION {
            return Err(DemoError::UnsupportedVersion(version));
        }

        let rng_seed = read_u32(&mut cursor, "rng seed")?;

        let product_len = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| truncated("product version"))? as usize;
        if product_len > MAX_PRODUCT_VERSION_LEN {
            return Err(DemoError::Format(format!(
                "product version length {product_len} exceeds {MAX_PRODUCT_VERSION_LEN}"
            )));
        }
        let mut product = vec![0u8; product_len];
        cursor
            .read_exact(&mut product)
            .map_err(|_| truncated("product version"))?;
        let product_version = String::from_utf8_lossy(&product).into_owned();

        let markers = if version >= 2 {
            let block_len = read_u32(&mut cursor, "marker block length")? as usize;
            if block_len >= remaining(&cursor) {
                return Err(DemoError::Format(format!(
                    "marker block of {block_len} bytes overruns file"
                )));
            }
            let mut block = vec![0u8; block_len];
            cursor
                .read_exact(&mut block)
                .map_err(|_| truncated("marker block"))?;
            parse_markers(block)?
        } else {
            Vec::new()
        };

        let total_ticks = read_u32(&mut cursor, "tick count")?;

        let offset = cursor.position() as usize;
        let stream = data[offset..].to_vec();
        if stream.is_empty() {
            return Err(DemoError::Format("command stream is empty".into()));
        }

        Ok(Self {
            version,
            rng_seed,
            product_version,
            markers,
            total_ticks,
            stream,
        })
    }

    /// Write in the current format version
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(DEMO_MAGIC)?;
        writer.write_u32::<LittleEndian>(DEMO_VERSION)?;
        writer.write_u32::<LittleEndian>(self.rng_seed)?;

        let product = self.product_version.as_bytes();
        let product = &product[..product.len().min(MAX_PRODUCT_VERSION_LEN)];
        writer.write_u16::<LittleEndian>(product.len() as u16)?;
        writer.write_all(product)?;

        let block = encode_markers(&self.markers);
        writer.write_u32::<LittleEndian>(block.len() as u32)?;
        writer.write_all(&block)?;

        writer.write_u32::<LittleEndian>(self.total_ticks)?;
        writer.write_all(&self.stream)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut out);
        out
    }

    /// Refuse to replay a demo recorded by a different product build
    pub fn check_product(&self, running: &str) -> DemoResult<()> {
        if self.product_version != running {
            return Err(DemoError::ProductMismatch {
                recorded: self.product_version.clone(),
                running: running.to_string(),
            });
        }
        Ok(())
    }

    /// Find a marker by label
    pub fn marker(&self, label: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.label == label)
    }

    /// Decode the whole stream as (tick, command) pairs
    ///
    /// Replay decodes incrementally through the channel; this is for tools.
    pub fn commands(&self) -> DemoResult<Vec<(u32, Command)>> {
        let mut buf = BitBuffer::from_bytes(self.stream.clone());
        let mut tick = 0u32;
        let mut commands = Vec::new();
        while buf.bits_remaining() >= MIN_COMMAND_BITS {
            tick = tick.saturating_add(buf.read_bits(TIMING_BITS)?);
            commands.push((tick, Command::decode(&mut buf)?));
        }
        Ok(commands)
    }
}

fn read_u32(cursor: &mut Cursor<&[u8]>, what: &str) -> DemoResult<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| truncated(what))
}

fn truncated(what: &str) -> DemoError {
    DemoError::Format(format!("truncated header reading {what}"))
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len().saturating_sub(cursor.position() as usize)
}

fn encode_markers(markers: &[Marker]) -> Vec<u8> {
    let mut block = BitBuffer::new();
    block.write_long(markers.len() as u32);
    for marker in markers {
        block.write_string(&marker.label);
        block.write_long(marker.tick);
    }
    block.data().to_vec()
}

fn parse_markers(block: Vec<u8>) -> DemoResult<Vec<Marker>> {
    let mut buf = BitBuffer::from_bytes(block);
    let mismatch = |_| DemoError::Format("marker count does not match marker block".into());

    let count = buf.read_long().map_err(mismatch)?;
    let mut markers = Vec::new();
    for _ in 0..count {
        let label = buf.read_string().map_err(mismatch)?;
        let tick = buf.read_long().map_err(mismatch)?;
        markers.push(Marker { label, tick });
    }
    Ok(markers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DemoFile {
        DemoFile {
            version: DEMO_VERSION,
            rng_seed: 0xC0FFEE,
            product_version: "tickreel 0.1.0".into(),
            markers: vec![
                Marker {
                    label: "level-1".into(),
                    tick: 120,
                },
                Marker {
                    label: "boss".into(),
                    tick: 4000,
                },
            ],
            total_ticks: 5000,
            stream: vec![0x12, 0x34, 0x56],
        }
    }

    // =============================================================
    // Layout
    // =============================================================

    #[test]
    fn test_header_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..4], &DEMO_MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0xC0FFEEu32.to_le_bytes());
        assert_eq!(&bytes[12..14], &14u16.to_le_bytes());
        assert_eq!(&bytes[14..28], b"tickreel 0.1.0");
        assert_eq!(&bytes[bytes.len() - 3..], &[0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_parse_written_file() {
        let demo = sample();
        let parsed = DemoFile::from_bytes(&demo.to_bytes()).unwrap();
        assert_eq!(parsed, demo);
        assert_eq!(parsed.marker("boss").map(|m| m.tick), Some(4000));
    }

    #[test]
    fn test_version_one_has_no_marker_block() {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(DEMO_MAGIC).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.write_u32::<LittleEndian>(7).unwrap();
        bytes.write_u16::<LittleEndian>(1).unwrap();
        bytes.push(b'x');
        bytes.write_u32::<LittleEndian>(99).unwrap();
        bytes.push(0xAB);

        let demo = DemoFile::from_bytes(&bytes).unwrap();
        assert_eq!(demo.version, 1);
        assert!(demo.markers.is_empty());
        assert_eq!(demo.total_ticks, 99);
        assert_eq!(demo.stream, vec![0xAB]);
    }

    // =============================================================
    // Rejection
    // =============================================================

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            DemoFile::from_bytes(&bytes),
            Err(DemoError::Format(msg)) if msg.contains("magic")
        ));
    }

    #[test]
    fn test_future_version() {
        let mut bytes = sample().to_bytes();
        bytes[4..8].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            DemoFile::from_bytes(&bytes),
            Err(DemoError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = sample().to_bytes();
        for len in [0, 3, 10, 20] {
            assert!(
                matches!(DemoFile::from_bytes(&bytes[..len]), Err(DemoError::Format(_))),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_marker_count_mismatch() {
        let demo = sample();
        let mut bytes = demo.to_bytes();
        // Marker count lives right after the block length
        let count_at = 14 + demo.product_version.len() + 4;
        bytes[count_at] = 9;
        assert!(matches!(
            DemoFile::from_bytes(&bytes),
            Err(DemoError::Format(msg)) if msg.contains("marker count")
        ));
    }

    #[test]
    fn test_empty_stream_rejected() {
        let mut demo = sample();
        demo.stream.clear();
        assert!(matches!(
            DemoFile::from_bytes(&demo.to_bytes()),
            Err(DemoError::Format(msg)) if msg.contains("empty")
        ));
    }

    #[test]
    fn test_product_mismatch() {
        let demo = sample();
        assert!(demo.check_product("tickreel 0.1.0").is_ok());
        let err = demo.check_product("tickreel 0.2.0").unwrap_err();
        assert!(err.to_string().contains("tickreel 0.1.0"));
    }

    #[test]
    fn test_commands_listing_accumulates_ticks() {
        let mut rec = crate::demo::DemoChannel::recording(1, "t");
        rec.record(&Command::LoadingComplete);
        for _ in 0..18 {
            rec.advance_tick();
        }
        rec.record(&Command::KeyDown(0x41));

        let listing = rec.to_demo_file().commands().unwrap();
        assert_eq!(
            listing,
            vec![
                (0, Command::LoadingComplete),
                (15, Command::Idle),
                (18, Command::KeyDown(0x41)),
            ]
        );
    }

    #[test]
    fn test_commands_listing_reports_truncation() {
        let mut demo = sample();
        // Long-form sync-buffer claiming more bytes than the stream holds
        let mut buf = BitBuffer::new();
        buf.write_bits(0, TIMING_BITS);
        Command::SyncBuffer(vec![1, 2, 3, 4, 5, 6, 7, 8]).encode(&mut buf);
        demo.stream = buf.data()[..4].to_vec();
        assert!(matches!(demo.commands(), Err(DemoError::Truncated(_))));
    }

    // =============================================================
    // Disk
    // =============================================================

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/demo1.dmo");

        sample().save(&path).unwrap();
        assert!(!path.with_extension("dmo.tmp").exists());
        assert_eq!(DemoFile::load(&path).unwrap(), sample());
    }

    #[test]
    fn test_load_missing_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DemoFile::load(dir.path().join("absent.dmo")).unwrap_err();
        assert!(err.to_string().contains("absent.dmo"));
    }
}
