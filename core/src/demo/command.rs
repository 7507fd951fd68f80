//! Demo command vocabulary and its bit-level encoding
//!
//! Every command is preceded in the stream by a timing nibble (written by the
//! channel), then a 1-bit form discriminator: `1` selects the short form with
//! a 1-bit opcode, `0` selects the long form with a 5-bit opcode. The payload
//! follows immediately.

use std::fmt;

use crate::bits::BitBuffer;
use crate::error::{DemoError, DemoResult};
use crate::proxy::RegistryValue;

/// Bits in the short-form opcode
pub const SHORT_OPCODE_BITS: u32 = 1;
/// Bits in the long-form opcode
pub const LONG_OPCODE_BITS: u32 = 5;
/// Bits in a timing nibble
pub const TIMING_BITS: u32 = 4;
/// Largest tick delta a single timing nibble can carry
pub const MAX_TIMING_DELTA: u32 = (1 << TIMING_BITS) - 1;
/// Smallest complete command: nibble + discriminator + short opcode + button payload
pub const MIN_COMMAND_BITS: u64 = (TIMING_BITS + 1 + SHORT_OPCODE_BITS + 4) as u64;

/// Range of a relative mouse move in the short form
pub const MOUSE_DELTA_RANGE: std::ops::RangeInclusive<i32> = -32..=31;
/// Largest coordinate an absolute mouse position can carry (12 bits)
pub const MAX_MOUSE_COORD: u16 = 0x0FFF;
/// Range of a mouse button code (3-bit signed)
pub const MOUSE_BUTTON_RANGE: std::ops::RangeInclusive<i8> = -4..=3;

/// Short-form opcodes (hot-path mouse events)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShortOpcode {
    MouseDelta = 0,
    MouseButton = 1,
}

/// Long-form opcodes
///
/// Values are part of the file format. New commands are appended; existing
/// values never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LongOpcode {
    MousePosition = 0,
    Activate = 1,
    Minimize = 2,
    MouseWheel = 3,
    KeyDown = 4,
    KeyUp = 5,
    KeyChar = 6,
    Close = 7,
    MouseEnter = 8,
    MouseExit = 9,
    LoadingComplete = 10,
    VideoMode = 11,
    Idle = 12,
    SyncBuffer = 13,
    AssertString = 14,
    AssertInt = 15,
    RegistryWrite = 16,
    RegistryErase = 17,
    FileWrite = 18,
    FileRead = 19,
    FileExists = 20,
    RegistryRead = 21,
    RegistrySubkeys = 22,
}

impl LongOpcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        use LongOpcode::*;
        Some(match value {
            0 => MousePosition,
            1 => Activate,
            2 => Minimize,
            3 => MouseWheel,
            4 => KeyDown,
            5 => KeyUp,
            6 => KeyChar,
            7 => Close,
            8 => MouseEnter,
            9 => MouseExit,
            10 => LoadingComplete,
            11 => VideoMode,
            12 => Idle,
            13 => SyncBuffer,
            14 => AssertString,
            15 => AssertInt,
            16 => RegistryWrite,
            17 => RegistryErase,
            18 => FileWrite,
            19 => FileRead,
            20 => FileExists,
            21 => RegistryRead,
            22 => RegistrySubkeys,
            _ => return None,
        })
    }
}

/// Opcode of either form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Short(ShortOpcode),
    Long(LongOpcode),
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Short(op) => write!(f, "{op:?}"),
            Opcode::Long(op) => write!(f, "{op:?}"),
        }
    }
}

/// One decoded demo command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Relative pointer motion, each axis in [`MOUSE_DELTA_RANGE`]
    MouseDelta { dx: i8, dy: i8 },
    /// Button edge at the last pointer position. `button` is the signed
    /// click code (1 left, 2 left double-click, 3 middle, -1 right, -2 right
    /// double-click) within [`MOUSE_BUTTON_RANGE`].
    MouseButton { down: bool, button: i8 },
    MousePosition { x: u16, y: u16 },
    Activate(bool),
    Minimize(bool),
    MouseWheel(i8),
    KeyDown(u8),
    KeyUp(u8),
    KeyChar(u16),
    Close,
    MouseEnter,
    MouseExit,
    LoadingComplete,
    VideoMode { windowed: bool, refresh_rate: u8 },
    Idle,
    SyncBuffer(Vec<u8>),
    AssertString(String),
    AssertInt(u32),
    RegistryWrite { ok: bool },
    RegistryErase { ok: bool },
    FileWrite { ok: bool },
    /// `None` records a failed read
    FileRead(Option<Vec<u8>>),
    FileExists(bool),
    RegistryRead(Option<RegistryValue>),
    RegistrySubkeys(Option<Vec<String>>),
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        use Command::*;
        match self {
            MouseDelta { .. } => Opcode::Short(ShortOpcode::MouseDelta),
            MouseButton { .. } => Opcode::Short(ShortOpcode::MouseButton),
            MousePosition { .. } => Opcode::Long(LongOpcode::MousePosition),
            Activate(_) => Opcode::Long(LongOpcode::Activate),
            Minimize(_) => Opcode::Long(LongOpcode::Minimize),
            MouseWheel(_) => Opcode::Long(LongOpcode::MouseWheel),
            KeyDown(_) => Opcode::Long(LongOpcode::KeyDown),
            KeyUp(_) => Opcode::Long(LongOpcode::KeyUp),
            KeyChar(_) => Opcode::Long(LongOpcode::KeyChar),
            Close => Opcode::Long(LongOpcode::Close),
            MouseEnter => Opcode::Long(LongOpcode::MouseEnter),
            MouseExit => Opcode::Long(LongOpcode::MouseExit),
            LoadingComplete => Opcode::Long(LongOpcode::LoadingComplete),
            VideoMode { .. } => Opcode::Long(LongOpcode::VideoMode),
            Idle => Opcode::Long(LongOpcode::Idle),
            SyncBuffer(_) => Opcode::Long(LongOpcode::SyncBuffer),
            AssertString(_) => Opcode::Long(LongOpcode::AssertString),
            AssertInt(_) => Opcode::Long(LongOpcode::AssertInt),
            RegistryWrite { .. } => Opcode::Long(LongOpcode::RegistryWrite),
            RegistryErase { .. } => Opcode::Long(LongOpcode::RegistryErase),
            FileWrite { .. } => Opcode::Long(LongOpcode::FileWrite),
            FileRead(_) => Opcode::Long(LongOpcode::FileRead),
            FileExists(_) => Opcode::Long(LongOpcode::FileExists),
            RegistryRead(_) => Opcode::Long(LongOpcode::RegistryRead),
            RegistrySubkeys(_) => Opcode::Long(LongOpcode::RegistrySubkeys),
        }
    }

    /// Whether this command is an input event delivered to the host
    /// (as opposed to a side-effect outcome or an assertion)
    pub fn is_input(&self) -> bool {
        use Command::*;
        matches!(
            self,
            MouseDelta { .. }
                | MouseButton { .. }
                | MousePosition { .. }
                | Activate(_)
                | Minimize(_)
                | MouseWheel(_)
                | KeyDown(_)
                | KeyUp(_)
                | KeyChar(_)
                | Close
                | MouseEnter
                | MouseExit
                | LoadingComplete
                | VideoMode { .. }
        )
    }

    /// Append the discriminator, opcode and payload (not the timing nibble)
    pub fn encode(&self, buf: &mut BitBuffer) {
        match self.opcode() {
            Opcode::Short(op) => {
                buf.write_bits(1, 1);
                buf.write_bits(op as u32, SHORT_OPCODE_BITS);
            }
            Opcode::Long(op) => {
                buf.write_bits(0, 1);
                buf.write_bits(op as u32, LONG_OPCODE_BITS);
            }
        }

        use Command::*;
        match self {
            MouseDelta { dx, dy } => {
                debug_assert!(MOUSE_DELTA_RANGE.contains(&i32::from(*dx)));
                debug_assert!(MOUSE_DELTA_RANGE.contains(&i32::from(*dy)));
                buf.write_signed_bits(i32::from(*dx), 6);
                buf.write_signed_bits(i32::from(*dy), 6);
            }
            MouseButton { down, button } => {
                debug_assert!(MOUSE_BUTTON_RANGE.contains(button));
                buf.write_bool(*down);
                buf.write_signed_bits(i32::from(*button), 3);
            }
            MousePosition { x, y } => {
                buf.write_bits(u32::from(*x), 12);
                buf.write_bits(u32::from(*y), 12);
            }
            Activate(flag) | Minimize(flag) | FileExists(flag) => buf.write_bool(*flag),
            RegistryWrite { ok } | RegistryErase { ok } | FileWrite { ok } => buf.write_bool(*ok),
            MouseWheel(delta) => buf.write_signed_bits(i32::from(*delta), 8),
            KeyDown(code) | KeyUp(code) => buf.write_byte(*code),
            KeyChar(ch) => {
                let wide = *ch > 0xFF;
                buf.write_bool(wide);
                buf.write_bits(u32::from(*ch), if wide { 16 } else { 8 });
            }
            Close | MouseEnter | MouseExit | LoadingComplete | Idle => {}
            VideoMode {
                windowed,
                refresh_rate,
            } => {
                buf.write_bool(*windowed);
                buf.write_byte(*refresh_rate);
            }
            SyncBuffer(bytes) => {
                buf.write_long(bytes.len() as u32);
                buf.write_bytes(bytes);
            }
            AssertString(value) => buf.write_string(value),
            AssertInt(value) => buf.write_long(*value),
            FileRead(result) => {
                buf.write_bool(result.is_some());
                if let Some(bytes) = result {
                    buf.write_long(bytes.len() as u32);
                    buf.write_bytes(bytes);
                }
            }
            RegistryRead(result) => {
                buf.write_bool(result.is_some());
                if let Some(value) = result {
                    buf.write_long(value.kind);
                    buf.write_long(value.data.len() as u32);
                    buf.write_bytes(&value.data);
                }
            }
            RegistrySubkeys(result) => {
                buf.write_bool(result.is_some());
                if let Some(keys) = result {
                    buf.write_long(keys.len() as u32);
                    for key in keys {
                        buf.write_string(key);
                    }
                }
            }
        }
    }

    /// Decode one command starting at the discriminator bit
    pub fn decode(buf: &mut BitBuffer) -> DemoResult<Self> {
        let is_short = buf.read_bool()?;
        if is_short {
            let command = match buf.read_bits(SHORT_OPCODE_BITS)? {
                0 => Command::MouseDelta {
                    dx: buf.read_signed_bits(6)? as i8,
                    dy: buf.read_signed_bits(6)? as i8,
                },
                _ => Command::MouseButton {
                    down: buf.read_bool()?,
                    button: buf.read_signed_bits(3)? as i8,
                },
            };
            return Ok(command);
        }

        let raw = buf.read_bits(LONG_OPCODE_BITS)? as u8;
        let opcode = LongOpcode::from_u8(raw)
            .ok_or_else(|| DemoError::Format(format!("unknown long opcode {raw}")))?;

        use LongOpcode as L;
        let command = match opcode {
            L::MousePosition => Command::MousePosition {
                x: buf.read_bits(12)? as u16,
                y: buf.read_bits(12)? as u16,
            },
            L::Activate => Command::Activate(buf.read_bool()?),
            L::Minimize => Command::Minimize(buf.read_bool()?),
            L::MouseWheel => Command::MouseWheel(buf.read_signed_bits(8)? as i8),
            L::KeyDown => Command::KeyDown(buf.read_byte()?),
            L::KeyUp => Command::KeyUp(buf.read_byte()?),
            L::KeyChar => {
                let width = if buf.read_bool()? { 16 } else { 8 };
                Command::KeyChar(buf.read_bits(width)? as u16)
            }
            L::Close => Command::Close,
            L::MouseEnter => Command::MouseEnter,
            L::MouseExit => Command::MouseExit,
            L::LoadingComplete => Command::LoadingComplete,
            L::VideoMode => Command::VideoMode {
                windowed: buf.read_bool()?,
                refresh_rate: buf.read_byte()?,
            },
            L::Idle => Command::Idle,
            L::SyncBuffer => Command::SyncBuffer(read_sized_bytes(buf)?),
            L::AssertString => Command::AssertString(buf.read_string()?),
            L::AssertInt => Command::AssertInt(buf.read_long()?),
            L::RegistryWrite => Command::RegistryWrite {
                ok: buf.read_bool()?,
            },
            L::RegistryErase => Command::RegistryErase {
                ok: buf.read_bool()?,
            },
            L::FileWrite => Command::FileWrite {
                ok: buf.read_bool()?,
            },
            L::FileRead => Command::FileRead(if buf.read_bool()? {
                Some(read_sized_bytes(buf)?)
            } else {
                None
            }),
            L::FileExists => Command::FileExists(buf.read_bool()?),
            L::RegistryRead => Command::RegistryRead(if buf.read_bool()? {
                let kind = buf.read_long()?;
                let data = read_sized_bytes(buf)?;
                Some(RegistryValue { kind, data })
            } else {
                None
            }),
            L::RegistrySubkeys => Command::RegistrySubkeys(if buf.read_bool()? {
                let count = buf.read_long()?;
                let mut keys = Vec::new();
                for _ in 0..count {
                    keys.push(buf.read_string()?);
                }
                Some(keys)
            } else {
                None
            }),
        };
        Ok(command)
    }
}

/// u32 length followed by that many bytes; the length is checked against
/// what is left so a corrupt prefix cannot trigger a huge allocation
fn read_sized_bytes(buf: &mut BitBuffer) -> DemoResult<Vec<u8>> {
    let len = buf.read_long()?;
    if u64::from(len) * 8 > buf.bits_remaining() {
        return Err(DemoError::Format(format!(
            "payload length {len} exceeds remaining stream"
        )));
    }
    Ok(buf.read_bytes(len as usize)?)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Command::*;
        match self {
            MouseDelta { dx, dy } => write!(f, "mouse-delta {dx:+} {dy:+}"),
            MouseButton { down, button } => {
                write!(f, "mouse-{} {button}", if *down { "down" } else { "up" })
            }
            MousePosition { x, y } => write!(f, "mouse-position {x} {y}"),
            Activate(active) => write!(f, "activate {active}"),
            Minimize(minimized) => write!(f, "minimize {minimized}"),
            MouseWheel(delta) => write!(f, "mouse-wheel {delta:+}"),
            KeyDown(code) => write!(f, "key-down 0x{code:02X}"),
            KeyUp(code) => write!(f, "key-up 0x{code:02X}"),
            KeyChar(ch) => match char::from_u32(u32::from(*ch)) {
                Some(c) if !c.is_control() => write!(f, "key-char {c:?}"),
                _ => write!(f, "key-char U+{ch:04X}"),
            },
            Close => f.write_str("close"),
            MouseEnter => f.write_str("mouse-enter"),
            MouseExit => f.write_str("mouse-exit"),
            LoadingComplete => f.write_str("loading-complete"),
            VideoMode {
                windowed,
                refresh_rate,
            } => write!(f, "video-mode windowed={windowed} refresh={refresh_rate}"),
            Idle => f.write_str("idle"),
            SyncBuffer(bytes) => write!(f, "sync-buffer {} bytes", bytes.len()),
            AssertString(value) => write!(f, "assert-string {value:?}"),
            AssertInt(value) => write!(f, "assert-int {value}"),
            RegistryWrite { ok } => write!(f, "registry-write ok={ok}"),
            RegistryErase { ok } => write!(f, "registry-erase ok={ok}"),
            FileWrite { ok } => write!(f, "file-write ok={ok}"),
            FileRead(Some(bytes)) => write!(f, "file-read {} bytes", bytes.len()),
            FileRead(None) => f.write_str("file-read failed"),
            FileExists(exists) => write!(f, "file-exists {exists}"),
            RegistryRead(Some(value)) => {
                write!(f, "registry-read type={} {} bytes", value.kind, value.data.len())
            }
            RegistryRead(None) => f.write_str("registry-read failed"),
            RegistrySubkeys(Some(keys)) => write!(f, "registry-subkeys {}", keys.len()),
            RegistrySubkeys(None) => f.write_str("registry-subkeys failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(command: &Command) -> Command {
        let mut buf = BitBuffer::new();
        command.encode(&mut buf);
        let decoded = Command::decode(&mut buf).unwrap();
        assert!(buf.at_end(), "trailing bits after {command}");
        decoded
    }

    #[test]
    fn test_short_form_sizes() {
        let mut buf = BitBuffer::new();
        Command::MouseDelta { dx: 5, dy: 3 }.encode(&mut buf);
        assert_eq!(buf.bits_remaining(), 1 + 1 + 12);

        let mut buf = BitBuffer::new();
        Command::MouseButton {
            down: true,
            button: 1,
        }
        .encode(&mut buf);
        assert_eq!(buf.bits_remaining(), 1 + 1 + 4);
    }

    #[test]
    fn test_long_form_header() {
        let mut buf = BitBuffer::new();
        Command::Idle.encode(&mut buf);
        assert_eq!(buf.bits_remaining(), 6);
        assert!(!buf.read_bool().unwrap());
        assert_eq!(buf.read_bits(5).unwrap(), LongOpcode::Idle as u32);
    }

    #[test]
    fn test_negative_payloads_survive() {
        assert_eq!(
            decode_one(&Command::MouseDelta { dx: -32, dy: 31 }),
            Command::MouseDelta { dx: -32, dy: 31 }
        );
        assert_eq!(
            decode_one(&Command::MouseButton {
                down: false,
                button: -1
            }),
            Command::MouseButton {
                down: false,
                button: -1
            }
        );
        assert_eq!(decode_one(&Command::MouseWheel(-120)), Command::MouseWheel(-120));
    }

    #[test]
    fn test_key_char_width_selector() {
        let mut narrow = BitBuffer::new();
        Command::KeyChar(u16::from(b'a')).encode(&mut narrow);
        let mut wide = BitBuffer::new();
        Command::KeyChar(0x263A).encode(&mut wide);
        assert_eq!(wide.bits_remaining() - narrow.bits_remaining(), 8);

        assert_eq!(decode_one(&Command::KeyChar(0x263A)), Command::KeyChar(0x263A));
    }

    #[test]
    fn test_side_effect_payloads() {
        let read = Command::FileRead(Some(vec![1, 2, 3, 4]));
        assert_eq!(decode_one(&read), read);
        assert_eq!(decode_one(&Command::FileRead(None)), Command::FileRead(None));

        let value = Command::RegistryRead(Some(RegistryValue::dword(42)));
        assert_eq!(decode_one(&value), value);

        let keys = Command::RegistrySubkeys(Some(vec!["Profiles".into(), "Stats".into()]));
        assert_eq!(decode_one(&keys), keys);
    }

    #[test]
    fn test_every_long_opcode_maps_back() {
        for raw in 0..=22u8 {
            let op = LongOpcode::from_u8(raw).unwrap();
            assert_eq!(op as u8, raw);
        }
        assert_eq!(LongOpcode::from_u8(23), None);
        assert_eq!(LongOpcode::from_u8(31), None);
    }

    #[test]
    fn test_unknown_opcode_is_format_error() {
        let mut buf = BitBuffer::new();
        buf.write_bits(0, 1);
        buf.write_bits(30, 5);
        assert!(matches!(
            Command::decode(&mut buf),
            Err(DemoError::Format(_))
        ));
    }

    #[test]
    fn test_corrupt_length_prefix_rejected() {
        let mut buf = BitBuffer::new();
        buf.write_bits(0, 1);
        buf.write_bits(LongOpcode::SyncBuffer as u32, 5);
        buf.write_long(1_000_000);
        buf.write_bytes(&[1, 2]);
        assert!(matches!(
            Command::decode(&mut buf),
            Err(DemoError::Format(_))
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let mut buf = BitBuffer::new();
        buf.write_bits(0, 1);
        buf.write_bits(LongOpcode::AssertInt as u32, 5);
        buf.write_bits(7, 8);
        assert!(matches!(
            Command::decode(&mut buf),
            Err(DemoError::Truncated(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Command::MouseDelta { dx: 5, dy: -3 }.to_string(),
            "mouse-delta +5 -3"
        );
        assert_eq!(Command::KeyChar(u16::from(b'A')).to_string(), "key-char 'A'");
        assert_eq!(Command::FileRead(None).to_string(), "file-read failed");
    }
}
