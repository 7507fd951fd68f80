//! Bit-packed byte buffer
//!
//! The demo command stream is a sequence of variable-width fields packed
//! least-significant-bit first into bytes. [`BitBuffer`] owns the bytes and
//! keeps two independent cursors: the write cursor (end of data) and a
//! bit-granular read cursor. Neither cursor is exposed to callers.

use crate::error::BufferError;

/// Growable bit-addressed buffer with separate read and write cursors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitBuffer {
    data: Vec<u8>,
    /// Bits written so far
    write_pos: u64,
    /// Bits consumed by readers
    read_pos: u64,
}

impl BitBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing bytes for reading; the read cursor starts at bit 0
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let write_pos = data.len() as u64 * 8;
        Self {
            data,
            write_pos,
            read_pos: 0,
        }
    }

    /// Packed bytes (the final byte may be partially used)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bits between the read cursor and the write cursor
    pub fn bits_remaining(&self) -> u64 {
        self.write_pos - self.read_pos
    }

    /// True once the read cursor has caught up with the write cursor
    pub fn at_end(&self) -> bool {
        self.read_pos >= self.write_pos
    }

    /// Drop all data and reset both cursors
    pub fn clear(&mut self) {
        self.data.clear();
        self.write_pos = 0;
        self.read_pos = 0;
    }

    /// Rewind the read cursor to the first bit; the data is untouched
    pub fn seek_front(&mut self) {
        self.read_pos = 0;
    }

    // ------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------

    /// Append the low `width` bits of `value`, LSB first
    ///
    /// # Panics
    ///
    /// Panics if `width` is greater than 32.
    pub fn write_bits(&mut self, value: u32, width: u32) {
        assert!(width <= 32, "bit width {width} exceeds 32");
        let mut value = u64::from(value) & mask(width);
        let mut remaining = width;

        while remaining > 0 {
            let bit_offset = (self.write_pos % 8) as u32;
            if bit_offset == 0 {
                self.data.push(0);
            }
            let take = (8 - bit_offset).min(remaining);
            let last = self.data.len() - 1;
            self.data[last] |= ((value & mask(take)) as u8) << bit_offset;

            value >>= take;
            remaining -= take;
            self.write_pos += u64::from(take);
        }
    }

    /// Append a two's-complement value truncated to `width` bits
    pub fn write_signed_bits(&mut self, value: i32, width: u32) {
        self.write_bits(value as u32, width);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bits(u32::from(value), 1);
    }

    pub fn write_byte(&mut self, value: u8) {
        self.write_bits(u32::from(value), 8);
    }

    pub fn write_short(&mut self, value: u16) {
        self.write_bits(u32::from(value), 16);
    }

    pub fn write_long(&mut self, value: u32) {
        self.write_bits(value, 32);
    }

    /// Append raw bytes at the current bit position
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.write_pos % 8 == 0 {
            self.data.extend_from_slice(bytes);
            self.write_pos += bytes.len() as u64 * 8;
        } else {
            for &byte in bytes {
                self.write_byte(byte);
            }
        }
    }

    /// Append a u16 length prefix followed by the UTF-8 bytes
    ///
    /// Strings longer than `u16::MAX` bytes are truncated.
    pub fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let len = bytes.len().min(usize::from(u16::MAX));
        self.write_short(len as u16);
        self.write_bytes(&bytes[..len]);
    }

    // ------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------

    /// Read `width` bits as an unsigned value
    ///
    /// # Panics
    ///
    /// Panics if `width` is greater than 32.
    pub fn read_bits(&mut self, width: u32) -> Result<u32, BufferError> {
        assert!(width <= 32, "bit width {width} exceeds 32");
        self.ensure(u64::from(width))?;

        let mut value = 0u64;
        let mut shift = 0;
        while shift < width {
            let byte = self.data[(self.read_pos / 8) as usize];
            let bit_offset = (self.read_pos % 8) as u32;
            let take = (8 - bit_offset).min(width - shift);
            let chunk = u64::from(byte >> bit_offset) & mask(take);

            value |= chunk << shift;
            shift += take;
            self.read_pos += u64::from(take);
        }
        Ok(value as u32)
    }

    /// Read `width` bits and sign-extend from the top bit
    ///
    /// # Panics
    ///
    /// Panics if `width` is zero or greater than 32.
    pub fn read_signed_bits(&mut self, width: u32) -> Result<i32, BufferError> {
        assert!((1..=32).contains(&width), "signed bit width {width} outside 1..=32");
        let raw = self.read_bits(width)?;
        let shift = 32 - width;
        Ok(((raw << shift) as i32) >> shift)
    }

    pub fn read_bool(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_bits(1)? != 0)
    }

    pub fn read_byte(&mut self) -> Result<u8, BufferError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_short(&mut self) -> Result<u16, BufferError> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_long(&mut self) -> Result<u32, BufferError> {
        self.read_bits(32)
    }

    /// Read `len` raw bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, BufferError> {
        self.ensure(len as u64 * 8)?;
        if self.read_pos % 8 == 0 {
            let start = (self.read_pos / 8) as usize;
            self.read_pos += len as u64 * 8;
            return Ok(self.data[start..start + len].to_vec());
        }
        (0..len).map(|_| self.read_byte()).collect()
    }

    /// Read a u16 length-prefixed string
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_string(&mut self) -> Result<String, BufferError> {
        let len = self.read_short()?;
        let bytes = self.read_bytes(usize::from(len))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn ensure(&self, bits: u64) -> Result<(), BufferError> {
        let remaining = self.bits_remaining();
        if bits > remaining {
            return Err(BufferError::OutOfRange {
                requested: bits,
                remaining,
            });
        }
        Ok(())
    }
}

#[inline]
fn mask(width: u32) -> u64 {
    (1u64 << width) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================
    // Unsigned round trips
    // =============================================================

    fn samples(width: u32) -> Vec<u32> {
        let max = mask(width) as u32;
        let mut values = vec![0, max, max / 2, max / 3, 1 & max];
        values.push(0xA5A5_A5A5 & max);
        values.dedup();
        values
    }

    #[test]
    fn test_round_trip_every_width() {
        let mut buffer = BitBuffer::new();
        for width in 1..=32 {
            for value in samples(width) {
                buffer.write_bits(value, width);
            }
        }

        for width in 1..=32 {
            for value in samples(width) {
                assert_eq!(buffer.read_bits(width).unwrap(), value, "width {width}");
            }
        }
        assert!(buffer.at_end());
    }

    #[test]
    fn test_lsb_first_packing() {
        let mut buffer = BitBuffer::new();
        buffer.write_bits(1, 1);
        buffer.write_bits(0b11, 2);
        buffer.write_bits(0b10101, 5);
        buffer.write_bits(0xF, 4);

        assert_eq!(buffer.data(), &[0b1010_1111, 0x0F]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.bits_remaining(), 12);
    }

    #[test]
    fn test_value_truncated_to_width() {
        let mut buffer = BitBuffer::new();
        buffer.write_bits(0xFF, 4);
        buffer.write_bits(0, 4);
        assert_eq!(buffer.data(), &[0x0F]);
    }

    // =============================================================
    // Sign extension
    // =============================================================

    #[test]
    fn test_signed_six_bit_deltas() {
        let mut buffer = BitBuffer::new();
        for delta in -32..=31 {
            buffer.write_signed_bits(delta, 6);
        }
        for delta in -32..=31 {
            assert_eq!(buffer.read_signed_bits(6).unwrap(), delta);
        }
    }

    #[test]
    fn test_signed_button_count_and_wheel() {
        let mut buffer = BitBuffer::new();
        buffer.write_signed_bits(-1, 3);
        buffer.write_signed_bits(-4, 3);
        buffer.write_signed_bits(3, 3);
        buffer.write_signed_bits(-128, 8);
        buffer.write_signed_bits(i32::MIN, 32);

        assert_eq!(buffer.read_signed_bits(3).unwrap(), -1);
        assert_eq!(buffer.read_signed_bits(3).unwrap(), -4);
        assert_eq!(buffer.read_signed_bits(3).unwrap(), 3);
        assert_eq!(buffer.read_signed_bits(8).unwrap(), -128);
        assert_eq!(buffer.read_signed_bits(32).unwrap(), i32::MIN);
    }

    #[test]
    fn test_unsigned_read_of_negative_is_masked() {
        let mut buffer = BitBuffer::new();
        buffer.write_signed_bits(-1, 6);
        assert_eq!(buffer.read_bits(6).unwrap(), 63);
    }

    // =============================================================
    // Byte-level helpers
    // =============================================================

    #[test]
    fn test_unaligned_bytes_and_strings() {
        let mut buffer = BitBuffer::new();
        buffer.write_bool(true);
        buffer.write_bytes(&[1, 2, 3, 4]);
        buffer.write_string("reel");
        buffer.write_long(0xDEAD_BEEF);

        assert!(buffer.read_bool().unwrap());
        assert_eq!(buffer.read_bytes(4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(buffer.read_string().unwrap(), "reel");
        assert_eq!(buffer.read_long().unwrap(), 0xDEAD_BEEF);
        assert!(buffer.at_end());
    }

    #[test]
    fn test_aligned_bytes_fast_path() {
        let mut buffer = BitBuffer::new();
        buffer.write_byte(7);
        buffer.write_bytes(b"abc");
        assert_eq!(buffer.data(), b"\x07abc");
        assert_eq!(buffer.read_byte().unwrap(), 7);
        assert_eq!(buffer.read_bytes(3).unwrap(), b"abc".to_vec());
    }

    // =============================================================
    // Cursor behaviour
    // =============================================================

    #[test]
    fn test_read_past_end_is_error() {
        let mut buffer = BitBuffer::new();
        buffer.write_bits(5, 3);
        assert_eq!(
            buffer.read_bits(4),
            Err(BufferError::OutOfRange {
                requested: 4,
                remaining: 3
            })
        );
        // A failed read does not move the cursor
        assert_eq!(buffer.read_bits(3).unwrap(), 5);
        assert!(buffer.read_bool().is_err());
        assert!(buffer.read_bytes(1).is_err());
    }

    #[test]
    fn test_seek_front_rewinds_reads_only() {
        let mut buffer = BitBuffer::new();
        buffer.write_short(0x1234);
        assert_eq!(buffer.read_short().unwrap(), 0x1234);
        assert!(buffer.at_end());

        buffer.seek_front();
        assert_eq!(buffer.bits_remaining(), 16);
        buffer.write_byte(0x56);
        assert_eq!(buffer.read_short().unwrap(), 0x1234);
        assert_eq!(buffer.read_byte().unwrap(), 0x56);
    }

    #[test]
    fn test_from_bytes_and_clear() {
        let mut buffer = BitBuffer::from_bytes(vec![0xFF, 0x01]);
        assert_eq!(buffer.bits_remaining(), 16);
        assert_eq!(buffer.read_bits(9).unwrap(), 0x1FF);

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.at_end());
        assert_eq!(buffer.bits_remaining(), 0);
    }
}
